use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::model::{ModelKind, Participant, TaskData, TrialBlock};
use crate::utils::error::{FitError, Result};

#[derive(Debug, Deserialize)]
struct TrialRow {
    participant: String,
    #[serde(default)]
    block: Option<String>,
    opt1_rewarded: String,
    mag_opt1: f64,
    mag_opt2: f64,
    choice1: String,
}

#[derive(Default)]
struct Blocks {
    single: TrialBlock,
    stable: TrialBlock,
    volatile: TrialBlock,
}

fn parse_flag(column: &str, value: &str, line: usize) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(true),
        "0" | "0.0" | "false" => Ok(false),
        other => Err(FitError::data(format!(
            "line {}: '{}' is not a valid {} flag (expected 1/0 or true/false)",
            line, other, column
        ))),
    }
}

/// Parses trial-level CSV into participants in order of first appearance.
///
/// For [`ModelKind::AlphaDifference`] every row needs a `block` of `stable` or
/// `volatile`, and every participant needs both.
pub fn parse_trials(bytes: &[u8], model: ModelKind) -> Result<Vec<Participant>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);

    let mut order: Vec<String> = Vec::new();
    let mut blocks: HashMap<String, Blocks> = HashMap::new();

    for (index, row) in reader.deserialize::<TrialRow>().enumerate() {
        let row = row?;
        // 標題列佔第 1 行
        let line = index + 2;

        let rewarded = parse_flag("opt1_rewarded", &row.opt1_rewarded, line)?;
        let choice = parse_flag("choice1", &row.choice1, line)?;

        let entry = blocks.entry(row.participant.clone()).or_insert_with(|| {
            order.push(row.participant.clone());
            Blocks::default()
        });

        let target = match model {
            ModelKind::SameAlpha => &mut entry.single,
            ModelKind::AlphaDifference => {
                match row.block.as_deref().map(|b| b.to_ascii_lowercase()).as_deref() {
                    Some("stable") => &mut entry.stable,
                    Some("volatile") => &mut entry.volatile,
                    Some(other) => {
                        return Err(FitError::data(format!(
                            "line {}: unknown block '{}' (expected stable or volatile)",
                            line, other
                        )))
                    }
                    None => {
                        return Err(FitError::data(format!(
                            "line {}: the alpha-difference model needs a block column",
                            line
                        )))
                    }
                }
            }
        };
        target.push(rewarded, row.mag_opt1, row.mag_opt2, choice);
    }

    if order.is_empty() {
        return Err(FitError::data("the trial file contains no rows"));
    }

    order
        .into_iter()
        .map(|id| {
            let b = blocks.remove(&id).unwrap_or_default();
            let data = match model {
                ModelKind::SameAlpha => TaskData::Single(b.single),
                ModelKind::AlphaDifference => {
                    if b.stable.is_empty() || b.volatile.is_empty() {
                        return Err(FitError::data(format!(
                            "participant {} needs both stable and volatile trials",
                            id
                        )));
                    }
                    TaskData::Split {
                        stable: b.stable,
                        volatile: b.volatile,
                    }
                }
            };
            Ok(Participant { id, data })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
participant,block,opt1_rewarded,mag_opt1,mag_opt2,choice1
s02,stable,1,40,60,0
s01,stable,true,10,90,false
s02,volatile,0,55,45,1
s01,volatile,False,70,30,TRUE
s01,stable,1.0,25,75,0
";

    #[test]
    fn test_same_alpha_groups_by_first_appearance() {
        let participants = parse_trials(CSV.as_bytes(), ModelKind::SameAlpha).unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].id, "s02");
        assert_eq!(participants[1].id, "s01");

        let TaskData::Single(block) = &participants[1].data else {
            panic!("expected a single block");
        };
        assert_eq!(block.opt1_rewarded, vec![true, false, true]);
        assert_eq!(block.mag_opt1, vec![10.0, 70.0, 25.0]);
        assert_eq!(block.choice1, vec![false, true, false]);
    }

    #[test]
    fn test_alpha_difference_splits_blocks() {
        let participants = parse_trials(CSV.as_bytes(), ModelKind::AlphaDifference).unwrap();
        let TaskData::Split { stable, volatile } = &participants[1].data else {
            panic!("expected split blocks");
        };
        assert_eq!(stable.len(), 2);
        assert_eq!(volatile.len(), 1);
        assert_eq!(volatile.mag_opt2, vec![30.0]);
    }

    #[test]
    fn test_block_column_is_optional_for_same_alpha() {
        let csv = "participant,opt1_rewarded,mag_opt1,mag_opt2,choice1\np1,1,10,20,1\n";
        let participants = parse_trials(csv.as_bytes(), ModelKind::SameAlpha).unwrap();
        assert_eq!(participants[0].data.n_trials(), 1);

        let err = parse_trials(csv.as_bytes(), ModelKind::AlphaDifference).unwrap_err();
        assert!(matches!(err, FitError::DataError { .. }));
    }

    #[test]
    fn test_missing_volatile_block_is_rejected() {
        let csv = "participant,block,opt1_rewarded,mag_opt1,mag_opt2,choice1\n\
                   p1,stable,1,10,20,1\n";
        let err = parse_trials(csv.as_bytes(), ModelKind::AlphaDifference).unwrap_err();
        assert!(err.to_string().contains("p1"));
    }

    #[test]
    fn test_bad_flag_reports_line() {
        let csv = "participant,opt1_rewarded,mag_opt1,mag_opt2,choice1\n\
                   p1,1,10,20,1\np1,yes,10,20,1\n";
        let err = parse_trials(csv.as_bytes(), ModelKind::SameAlpha).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[test]
    fn test_non_numeric_magnitude_is_csv_error() {
        let csv = "participant,opt1_rewarded,mag_opt1,mag_opt2,choice1\np1,1,ten,20,1\n";
        let err = parse_trials(csv.as_bytes(), ModelKind::SameAlpha).unwrap_err();
        assert!(matches!(err, FitError::CsvError(_)));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let csv = "participant,opt1_rewarded,mag_opt1,mag_opt2,choice1\n";
        assert!(parse_trials(csv.as_bytes(), ModelKind::SameAlpha).is_err());
    }
}
