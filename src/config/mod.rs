//! JSON config loader.
//!
//! Reads a single JSON document describing a channel's solver knobs,
//! bumper pools, and content pools, and eagerly validates it into the typed
//! [`ChannelConfig`] the rest of the pipeline runs against. Every problem
//! found here is a [`ConfigError`], raised before any solving is attempted.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::errors::ConfigError;
use crate::models::{
    BumperItem, BumperPoolConfig, BumpersConfig, ChannelConfig, Item, MediaType, MixingStrategy, PoolConfig,
    SolverConfig,
};
use crate::sequence::parse_sxxexx;

/// Read and validate a channel config from a JSON file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<ChannelConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&text)?;
    load_from_value(&raw)
}

/// The same validation [`load`] performs, against an already-parsed value.
/// Split out so tests can construct documents in-process.
pub fn load_from_value(raw: &Value) -> Result<ChannelConfig, ConfigError> {
    let root = raw
        .as_object()
        .ok_or_else(|| ConfigError::invalid("<root>", "top-level config must be a JSON object"))?;

    let solver_raw = root.get("solver").and_then(Value::as_object);
    let solver = parse_solver(solver_raw)?;

    let bumpers_raw = root
        .get("bumpers")
        .and_then(Value::as_object)
        .ok_or_else(|| ConfigError::missing("bumpers", "<root>"))?;
    let bumpers = parse_bumpers(bumpers_raw)?;

    let pools_raw = root
        .get("pools")
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ConfigError::invalid("pools", "must be a non-empty object mapping pool names to pool configs"))?;

    let mut pools: HashMap<String, PoolConfig> = HashMap::new();
    let mut pool_order: Vec<String> = Vec::new();
    let mut items: Vec<Item> = Vec::new();

    for (pool_name, pool_obj) in pools_raw.iter() {
        let pool_obj = pool_obj
            .as_object()
            .ok_or_else(|| ConfigError::invalid(format!("pools.{pool_name}"), "must be an object"))?;

        let default_type_str = pool_obj
            .get("default_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::missing("default_type", format!("pools.{pool_name}")))?;
        let default_type = parse_media_type(default_type_str, &format!("pools.{pool_name}.default_type"))?;

        let sequential = pool_obj.get("sequential").and_then(Value::as_bool).unwrap_or(false);

        let repeat_raw = pool_obj.get("repeat").and_then(Value::as_object);
        let default_repeatable = repeat_raw
            .and_then(|r| r.get("default_repeatable"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let default_repeat_cost_s = minutes_to_seconds(
            repeat_raw.and_then(|r| r.get("default_repeat_cost_min")),
            &format!("pools.{pool_name}.repeat.default_repeat_cost_min"),
            30.0,
        )?;
        let default_max_extra_uses = repeat_raw
            .and_then(|r| r.get("default_max_extra_uses"))
            .and_then(Value::as_u64)
            .unwrap_or(999) as u32;

        let diversity_raw = pool_obj.get("diversity").and_then(Value::as_object);
        let dominant_block_threshold_s = minutes_to_seconds(
            diversity_raw.and_then(|d| d.get("dominant_block_threshold_min")),
            &format!("pools.{pool_name}.diversity.dominant_block_threshold_min"),
            24.0,
        )?;
        let dominant_block_penalty_s = minutes_to_seconds(
            diversity_raw.and_then(|d| d.get("dominant_block_penalty_min")),
            &format!("pools.{pool_name}.diversity.dominant_block_penalty_min"),
            0.0,
        )?;

        pools.insert(
            pool_name.clone(),
            PoolConfig {
                name: pool_name.clone(),
                default_type,
                sequential,
                default_repeatable,
                default_repeat_cost_s,
                default_max_extra_uses,
                dominant_block_threshold_s,
                dominant_block_penalty_s,
            },
        );
        pool_order.push(pool_name.clone());

        let pool_items = pool_obj
            .get("items")
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ConfigError::invalid(format!("pools.{pool_name}.items"), "must be a non-empty list"))?;

        for (idx, it) in pool_items.iter().enumerate() {
            let where_ = format!("pools.{pool_name}.items[{idx}]");
            let it = it.as_object().ok_or_else(|| ConfigError::invalid(where_.as_str(), "must be an object"))?;

            let path = it
                .get("path")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ConfigError::invalid(format!("{where_}.path"), "must be a non-empty string"))?
                .to_string();

            let duration_s = minutes_to_seconds(
                Some(it.get("duration_min").ok_or_else(|| ConfigError::missing("duration_min", where_.as_str()))?),
                &format!("{where_}.duration_min"),
                0.0,
            )?;

            let media_type_str = it.get("type").and_then(Value::as_str).unwrap_or(default_type_str);
            let media_type = parse_media_type(media_type_str, &format!("{where_}.type"))?;

            let repeatable = it.get("repeatable").and_then(Value::as_bool).unwrap_or(default_repeatable);
            let repeat_cost_s = match it.get("repeat_cost_min") {
                Some(v) => minutes_to_seconds(Some(v), &format!("{where_}.repeat_cost_min"), 0.0)?,
                None => default_repeat_cost_s,
            };
            let max_extra_uses = it
                .get("max_extra_uses")
                .and_then(Value::as_u64)
                .map(|v| v as u32)
                .unwrap_or(default_max_extra_uses);

            let sequence_id = if sequential {
                Some(
                    parse_sxxexx(&path)
                        .ok_or_else(|| ConfigError::MissingSequenceId { where_: where_.clone(), path: path.clone() })?,
                )
            } else {
                None
            };

            items.push(Item {
                path,
                duration_s,
                pool: pool_name.clone(),
                media_type,
                repeatable,
                repeat_cost_s,
                max_extra_uses,
                sequence_id,
            });
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut dups = Vec::new();
    for it in &items {
        if !seen.insert(it.path.clone()) {
            dups.push(it.path.clone());
        }
    }
    if !dups.is_empty() {
        return Err(ConfigError::DuplicatePaths(dups));
    }

    Ok(ChannelConfig {
        solver,
        bumpers,
        pools,
        pool_order,
        items,
    })
}

fn parse_solver(solver_raw: Option<&serde_json::Map<String, Value>>) -> Result<SolverConfig, ConfigError> {
    let block_s = minutes_to_seconds(solver_raw.and_then(|s| s.get("block_minutes")), "solver.block_minutes", 30.0)?;
    let longform_consumes_block = solver_raw
        .and_then(|s| s.get("longform_consumes_block"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let allow_short_overflow_s = minutes_to_seconds(
        solver_raw.and_then(|s| s.get("allow_short_overflow_minutes")),
        "solver.allow_short_overflow_minutes",
        0.0,
    )?;
    let time_limit_sec = solver_raw
        .and_then(|s| s.get("time_limit_sec"))
        .and_then(Value::as_u64)
        .unwrap_or(60) as u32;
    let seed_raw = solver_raw.and_then(|s| s.get("seed").or_else(|| s.get("random_seed")));
    let seed = parse_seed(seed_raw, "solver.seed")?;

    Ok(SolverConfig {
        block_s,
        longform_consumes_block,
        allow_short_overflow_s,
        time_limit_sec,
        seed,
    })
}

fn parse_bumpers(bumpers_raw: &serde_json::Map<String, Value>) -> Result<BumpersConfig, ConfigError> {
    let slots_per_break = bumpers_raw.get("slots_per_break").and_then(Value::as_u64).unwrap_or(1) as u32;
    if slots_per_break == 0 {
        return Err(ConfigError::invalid("bumpers.slots_per_break", "must be >= 1"));
    }

    let mixing_strategy_str = bumpers_raw.get("mixing_strategy").and_then(Value::as_str).unwrap_or("round_robin");
    let mixing_strategy = match mixing_strategy_str {
        "round_robin" => MixingStrategy::RoundRobin,
        "weighted" => MixingStrategy::Weighted,
        other => {
            return Err(ConfigError::invalid(
                "bumpers.mixing_strategy",
                format!("must be one of: round_robin, weighted (got {other:?})"),
            ))
        }
    };

    let pools_raw = bumpers_raw
        .get("pools")
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ConfigError::invalid("bumpers.pools", "must be a non-empty object mapping pool names to pool configs"))?;

    let mut pools = Vec::with_capacity(pools_raw.len());
    for (pool_name, pool_obj) in pools_raw.iter() {
        if pool_name.is_empty() {
            return Err(ConfigError::invalid("bumpers.pools", "pool names must be non-empty strings"));
        }
        let pool_obj = pool_obj
            .as_object()
            .ok_or_else(|| ConfigError::invalid(format!("bumpers.pools.{pool_name}"), "must be an object"))?;

        let weight = pool_obj.get("weight").and_then(Value::as_f64).unwrap_or(1.0);
        let items_raw = pool_obj
            .get("items")
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ConfigError::invalid(format!("bumpers.pools.{pool_name}.items"), "must be a non-empty list"))?;

        let mut pool_items = Vec::with_capacity(items_raw.len());
        for (idx, it) in items_raw.iter().enumerate() {
            let where_ = format!("bumpers.pools.{pool_name}.items[{idx}]");
            let it = it.as_object().ok_or_else(|| ConfigError::invalid(where_.as_str(), "must be an object"))?;
            let path = it
                .get("path")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ConfigError::invalid(format!("{where_}.path"), "must be a non-empty string"))?
                .to_string();
            let media_type_str = it.get("type").and_then(Value::as_str).unwrap_or("other_video");
            let media_type = parse_media_type(media_type_str, &format!("{where_}.type"))?;
            let duration_s = minutes_to_seconds(
                Some(it.get("duration_min").ok_or_else(|| ConfigError::missing("duration_min", where_.as_str()))?),
                &format!("{where_}.duration_min"),
                0.0,
            )?;
            pool_items.push(BumperItem { path, duration_s, media_type });
        }

        pools.push(BumperPoolConfig {
            name: pool_name.clone(),
            weight,
            items: pool_items,
        });
    }

    Ok(BumpersConfig {
        slots_per_break,
        mixing_strategy,
        pools,
    })
}

fn parse_media_type(s: &str, where_: &str) -> Result<MediaType, ConfigError> {
    match s {
        "episode" => Ok(MediaType::Episode),
        "movie" => Ok(MediaType::Movie),
        "music_video" => Ok(MediaType::MusicVideo),
        "other_video" => Ok(MediaType::OtherVideo),
        other => Err(ConfigError::invalid(where_, format!("unknown media type {other:?}"))),
    }
}

/// Convert a minutes value (int or float) from the document into whole
/// seconds, rounding to the nearest second. `default_minutes` is used when
/// `value` is `None` (the field was absent).
fn minutes_to_seconds(value: Option<&Value>, where_: &str, default_minutes: f64) -> Result<u32, ConfigError> {
    let minutes = match value {
        None => default_minutes,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| ConfigError::invalid(where_, "expected a number of minutes"))?,
    };
    if minutes < 0.0 {
        return Err(ConfigError::invalid(where_, "duration must be non-negative"));
    }
    Ok((minutes * 60.0).round() as u32)
}

/// Parse a solver seed: absent or `0` means "auto" (represented as `0`,
/// resolved by the CLI layer, never here); an int is used as-is; a string is
/// tried as a base-10 or `0x`-prefixed base-16 literal, falling back to a
/// CRC32 hash folded into the non-negative 31-bit range.
fn parse_seed(value: Option<&Value>, where_: &str) -> Result<u32, ConfigError> {
    match value {
        None => Ok(0),
        Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| v as u32)
            .ok_or_else(|| ConfigError::invalid(where_, "seed must be a non-negative integer")),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(0);
            }
            let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                s.parse::<u32>().ok()
            };
            Ok(parsed.unwrap_or_else(|| crate::stable_hash::stable_hash(s) & 0x7FFF_FFFF))
        }
        Some(_) => Err(ConfigError::invalid(where_, "expected seed to be an int or string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_doc() -> Value {
        json!({
            "solver": { "block_minutes": 30.0 },
            "bumpers": {
                "slots_per_break": 1,
                "pools": {
                    "promo": {
                        "items": [{ "path": "/bump/a.mkv", "duration_min": 0.2 }]
                    }
                }
            },
            "pools": {
                "movies": {
                    "default_type": "movie",
                    "items": [{ "path": "/movies/one.mkv", "duration_min": 20.0 }]
                }
            }
        })
    }

    #[test]
    fn loads_minimal_document() {
        let cfg = load_from_value(&minimal_doc()).expect("should load");
        assert_eq!(cfg.solver.block_s, 1800);
        assert_eq!(cfg.items.len(), 1);
        assert_eq!(cfg.items[0].duration_s, 1200);
        assert_eq!(cfg.bumpers.pools.len(), 1);
    }

    #[test]
    fn rejects_duplicate_paths() {
        let mut doc = minimal_doc();
        doc["pools"]["tv"] = json!({
            "default_type": "episode",
            "items": [{ "path": "/movies/one.mkv", "duration_min": 20.0 }]
        });
        let err = load_from_value(&doc).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePaths(_)));
    }

    #[test]
    fn rejects_sequential_item_without_sxxexx() {
        let mut doc = minimal_doc();
        doc["pools"]["movies"]["sequential"] = json!(true);
        let err = load_from_value(&doc).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSequenceId { .. }));
    }

    #[test]
    fn parses_hex_seed_string() {
        let mut doc = minimal_doc();
        doc["solver"]["seed"] = json!("0x2A");
        let cfg = load_from_value(&doc).expect("should load");
        assert_eq!(cfg.solver.seed, 42);
    }

    #[test]
    fn hashes_non_numeric_seed_string() {
        let mut doc = minimal_doc();
        doc["solver"]["seed"] = json!("nightly-channel");
        let cfg = load_from_value(&doc).expect("should load");
        assert_eq!(cfg.solver.seed, crate::stable_hash::stable_hash("nightly-channel") & 0x7FFF_FFFF);
    }

    #[test]
    fn zero_seed_means_auto() {
        let mut doc = minimal_doc();
        doc["solver"]["seed"] = json!(0);
        let cfg = load_from_value(&doc).expect("should load");
        assert_eq!(cfg.solver.seed, 0);
    }
}
