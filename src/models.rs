//! Backend model identifiers

use crate::nodes::{Orientation, VideoDuration};

/// Map a video node's settings to the video backend's model id.
///
/// HD is only offered at 15s; `is_hd` is ignored for 10s and 25s.
pub fn map_to_sora_id(orientation: Orientation, duration: VideoDuration, is_hd: bool) -> &'static str {
    match (orientation, duration, is_hd) {
        (Orientation::Landscape, VideoDuration::Ten, _) => "sora-2-landscape-10s",
        (Orientation::Landscape, VideoDuration::Fifteen, false) => "sora-2-landscape-15s",
        (Orientation::Landscape, VideoDuration::Fifteen, true) => "sora-2-pro-landscape-hd-15s",
        (Orientation::Landscape, VideoDuration::TwentyFive, _) => "sora-2-pro-landscape-25s",
        (Orientation::Portrait, VideoDuration::Ten, _) => "sora-2-portrait-10s",
        (Orientation::Portrait, VideoDuration::Fifteen, false) => "sora-2-portrait-15s",
        (Orientation::Portrait, VideoDuration::Fifteen, true) => "sora-2-pro-portrait-hd-15s",
        (Orientation::Portrait, VideoDuration::TwentyFive, _) => "sora-2-pro-portrait-25s",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_documented_combination_has_a_distinct_id() {
        let table = [
            (Orientation::Landscape, VideoDuration::Ten, false, "sora-2-landscape-10s"),
            (Orientation::Landscape, VideoDuration::Fifteen, false, "sora-2-landscape-15s"),
            (Orientation::Landscape, VideoDuration::Fifteen, true, "sora-2-pro-landscape-hd-15s"),
            (Orientation::Landscape, VideoDuration::TwentyFive, false, "sora-2-pro-landscape-25s"),
            (Orientation::Portrait, VideoDuration::Ten, false, "sora-2-portrait-10s"),
            (Orientation::Portrait, VideoDuration::Fifteen, false, "sora-2-portrait-15s"),
            (Orientation::Portrait, VideoDuration::Fifteen, true, "sora-2-pro-portrait-hd-15s"),
            (Orientation::Portrait, VideoDuration::TwentyFive, false, "sora-2-pro-portrait-25s"),
        ];
        let mut seen = HashSet::new();
        for (orientation, duration, hd, expected) in table {
            let id = map_to_sora_id(orientation, duration, hd);
            assert_eq!(id, expected);
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }

    #[test]
    fn twenty_five_seconds_has_no_hd_variant() {
        for orientation in [Orientation::Landscape, Orientation::Portrait] {
            assert_eq!(
                map_to_sora_id(orientation, VideoDuration::TwentyFive, true),
                map_to_sora_id(orientation, VideoDuration::TwentyFive, false)
            );
        }
    }

    #[test]
    fn ten_seconds_ignores_hd() {
        assert_eq!(
            map_to_sora_id(Orientation::Portrait, VideoDuration::Ten, true),
            "sora-2-portrait-10s"
        );
    }
}
