//! Extracts `(season, episode)` identifiers from content paths.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::EpisodeId;

fn sxxexx_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bS(\d{1,2})E(\d{1,2})\b").expect("static regex is valid"))
}

/// Extract the first `SxxExx` token (case-insensitive, word-bounded) from a path.
///
/// Returns `None` if no such token is present. There is no fallback to other
/// naming heuristics; a sequential-pool item without a match is a config error.
pub fn parse_sxxexx(path: &str) -> Option<EpisodeId> {
    let caps = sxxexx_re().captures(path)?;
    let season: u32 = caps.get(1)?.as_str().parse().ok()?;
    let episode: u32 = caps.get(2)?.as_str().parse().ok()?;
    Some(EpisodeId { season, episode })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_standard_token() {
        let id = parse_sxxexx("/tv/Show/Season 01/Show - S01E02 - Title.mkv").unwrap();
        assert_eq!(id, EpisodeId { season: 1, episode: 2 });
    }

    #[test]
    fn case_insensitive_and_short_digits() {
        let id = parse_sxxexx("/tv/show.s1e2.mkv").unwrap();
        assert_eq!(id, EpisodeId { season: 1, episode: 2 });
    }

    #[test]
    fn takes_first_occurrence() {
        let id = parse_sxxexx("/tv/S01E02/backup-of-S05E09.mkv").unwrap();
        assert_eq!(id, EpisodeId { season: 1, episode: 2 });
    }

    #[test]
    fn word_boundary_rejects_embedded_digits() {
        assert!(parse_sxxexx("/movies/S010E020.mkv").is_none());
    }

    #[test]
    fn absent_returns_none() {
        assert!(parse_sxxexx("/movies/Some Movie (2020).mkv").is_none());
    }
}
