//! Ball-by-ball commentary text.
//!
//! A fixed lookup from the outcome of a delivery to a short line of text.
//! No names are involved, so the output depends only on the outcome.

use crate::models::delivery::{DismissalType, ExtraType};

fn runs_phrase(runs: u32) -> String {
    match runs {
        0 => "Dot ball".to_string(),
        1 => "1 run".to_string(),
        4 => "FOUR!".to_string(),
        6 => "SIX!".to_string(),
        n => format!("{} runs", n),
    }
}

fn dismissal_phrase(dismissal: DismissalType) -> &'static str {
    match dismissal {
        DismissalType::Bowled => "OUT! Clean bowled",
        DismissalType::Caught => "OUT! Caught",
        DismissalType::LegBeforeWicket => "OUT! LBW",
        DismissalType::RunOut => "OUT! Run out",
        DismissalType::Stumped => "OUT! Stumped",
        DismissalType::HitWicket => "OUT! Hit wicket",
    }
}

/// `runs` is the runs off the bat, or the runs taken for byes, leg-byes and
/// wides (without the penalty run).
pub fn commentary(runs: u32, extra: Option<ExtraType>, dismissal: Option<DismissalType>) -> String {
    if let Some(dismissal) = dismissal {
        let phrase = dismissal_phrase(dismissal);
        return if runs > 0 {
            format!("{} ({} completed)", phrase, runs_phrase(runs))
        } else {
            phrase.to_string()
        };
    }

    match extra {
        Some(ExtraType::Wide) if runs == 0 => "Wide ball".to_string(),
        Some(ExtraType::Wide) => format!("Wide ball, {} more", runs_phrase(runs)),
        Some(ExtraType::NoBall) if runs == 0 => "No ball".to_string(),
        Some(ExtraType::NoBall) => format!("No ball, {}", runs_phrase(runs)),
        Some(ExtraType::Bye) => match runs {
            1 => "1 bye".to_string(),
            n => format!("{} byes", n),
        },
        Some(ExtraType::LegBye) => match runs {
            1 => "1 leg bye".to_string(),
            n => format!("{} leg byes", n),
        },
        None => runs_phrase(runs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commentary_table() {
        let cases: Vec<(u32, Option<ExtraType>, Option<DismissalType>, &str)> = vec![
            (0, None, None, "Dot ball"),
            (1, None, None, "1 run"),
            (2, None, None, "2 runs"),
            (3, None, None, "3 runs"),
            (4, None, None, "FOUR!"),
            (6, None, None, "SIX!"),
            (0, Some(ExtraType::Wide), None, "Wide ball"),
            (4, Some(ExtraType::Wide), None, "Wide ball, FOUR! more"),
            (0, Some(ExtraType::NoBall), None, "No ball"),
            (6, Some(ExtraType::NoBall), None, "No ball, SIX!"),
            (1, Some(ExtraType::Bye), None, "1 bye"),
            (4, Some(ExtraType::Bye), None, "4 byes"),
            (2, Some(ExtraType::LegBye), None, "2 leg byes"),
            (0, None, Some(DismissalType::Bowled), "OUT! Clean bowled"),
            (0, None, Some(DismissalType::Caught), "OUT! Caught"),
            (0, None, Some(DismissalType::LegBeforeWicket), "OUT! LBW"),
            (0, None, Some(DismissalType::Stumped), "OUT! Stumped"),
            (0, None, Some(DismissalType::HitWicket), "OUT! Hit wicket"),
            (1, None, Some(DismissalType::RunOut), "OUT! Run out (1 run completed)"),
        ];

        for (runs, extra, dismissal, expected) in cases {
            assert_eq!(
                commentary(runs, extra, dismissal),
                expected,
                "runs={} extra={:?} dismissal={:?}",
                runs,
                extra,
                dismissal
            );
        }
    }

    #[test]
    fn test_six_mentions_six() {
        assert!(commentary(6, None, None).contains("SIX"));
    }
}
