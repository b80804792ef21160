use std::fs;
use std::path::PathBuf;

use tracing::info;

use mimeo_model::{Gender, Sample, Samples};

use crate::error::{SchemaError, SchemaResult};

/// Where sample sets come from. The engine resolves `func.sample(name)`
/// through this seam so tests can supply sets in memory.
pub trait SampleSource: Send + Sync {
    fn load(&self, name: &str) -> SchemaResult<Samples>;
}

/// Loads sample sets from files in a single directory, one file per set.
#[derive(Debug, Clone)]
pub struct FileSampleSource {
    dir: PathBuf,
}

impl FileSampleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Sorted list of the available sample set names.
    pub fn sample_names(&self) -> SchemaResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl SampleSource for FileSampleSource {
    fn load(&self, name: &str) -> SchemaResult<Samples> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Err(SchemaError::Samples {
                name: name.to_string(),
                reason: format!("file '{}' not found", path.display()),
            });
        }

        let content = fs::read_to_string(&path)?;
        let samples = parse_samples(name, &content)?;
        info!(set = name, count = samples.len(), "samples loaded");
        Ok(samples)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Column {
    Gender,
    Rarity,
}

/// Parses a samples file.
///
/// An optional header `#Name[,GENDER][,RARITY]` declares extra columns;
/// without one every line is a plain value. Blank lines and `#` comments
/// are skipped. Gendered sets must contain a non-rare sample for each
/// gender so picking can always terminate.
pub fn parse_samples(name: &str, content: &str) -> SchemaResult<Samples> {
    let bad = |reason: String| SchemaError::Samples {
        name: name.to_string(),
        reason,
    };

    let lines: Vec<&str> = content.lines().collect();
    let mut i = 0;

    // Skip leading blanks and comments that are not a column header.
    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() || (line.starts_with('#') && !line.contains(',')) {
            i += 1;
        } else {
            break;
        }
    }

    let mut num_cols = 1;
    let mut gender_col = 0;
    let mut rarity_col = 0;

    if i < lines.len() && lines[i].starts_with('#') && lines[i].contains(',') {
        let col_names: Vec<&str> = lines[i].split(',').collect();
        num_cols = col_names.len();

        if num_cols > 3 {
            return Err(bad("header must have 2 or 3 columns".into()));
        }

        // First column name is free-form; the rest must be known.
        for (col, col_name) in col_names.iter().enumerate().skip(1) {
            let col_name = col_name.trim();
            let column = if col_name.eq_ignore_ascii_case("GENDER") {
                Column::Gender
            } else if col_name.eq_ignore_ascii_case("RARITY") {
                Column::Rarity
            } else {
                return Err(bad(format!(
                    "header has invalid column name '{col_name}' - must be one of: GENDER, RARITY"
                )));
            };

            match column {
                Column::Gender => gender_col = col,
                Column::Rarity => rarity_col = col,
            }
        }

        i += 1;
    }

    let mut samples = Samples::new(name, gender_col != 0);
    let mut male_non_rare = false;
    let mut female_non_rare = false;

    for (line_no, line) in lines.iter().enumerate().skip(i) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut value = line.to_string();
        let mut gender = Gender::Neutral;
        let mut rarity = 0u8;

        if num_cols > 1 {
            let columns: Vec<&str> = line.split(',').map(str::trim).collect();
            if columns.len() > num_cols {
                return Err(bad(format!(
                    "line {} has too many columns (or embedded comma) - \
                     must match number of columns in header",
                    line_no + 1
                )));
            }

            let col = |idx: usize| columns.get(idx).copied().unwrap_or("");

            value = col(0).to_string();
            if value.is_empty() {
                return Err(bad(format!(
                    "line {} value cannot be blank. Use {} if you want a null value",
                    line_no + 1,
                    mimeo_model::NULL_VALUE
                )));
            }

            if gender_col != 0 {
                let gender_str = col(gender_col);
                if !gender_str.is_empty() {
                    gender = Gender::parse(gender_str).ok_or_else(|| {
                        bad(format!(
                            "line {} has gender '{gender_str}' but expected M or F",
                            line_no + 1
                        ))
                    })?;
                }
            }

            if rarity_col != 0 {
                let rarity_str = col(rarity_col);
                if !rarity_str.is_empty() {
                    let parsed: u8 = rarity_str.parse().map_err(|_| {
                        bad(format!(
                            "line {} has non-integer rarity '{rarity_str}'",
                            line_no + 1
                        ))
                    })?;
                    if !(1..=99).contains(&parsed) {
                        return Err(bad(format!(
                            "line {} has rarity {parsed} but expected either \
                             blank or value between 1 and 99",
                            line_no + 1
                        )));
                    }
                    rarity = parsed;
                }
            }
        }

        if rarity == 0 {
            if matches!(gender, Gender::Male | Gender::Neutral) {
                male_non_rare = true;
            }
            if matches!(gender, Gender::Female | Gender::Neutral) {
                female_non_rare = true;
            }
        }

        samples.add(Sample::new(value, gender, rarity))?;
    }

    if !male_non_rare {
        return Err(bad(non_rare_message(gender_col != 0, rarity_col != 0, "Male")));
    }
    if gender_col != 0 && !female_non_rare {
        return Err(bad(non_rare_message(true, rarity_col != 0, "Female")));
    }

    Ok(samples)
}

fn non_rare_message(gendered: bool, has_rarity: bool, gender: &str) -> String {
    let mut modifier = String::new();
    if gendered {
        modifier.push_str(&format!(" {gender}"));
    }
    if has_rarity {
        modifier.push_str(if modifier.is_empty() { " " } else { ", " });
        modifier.push_str("Non-rare (rarity left blank)");
    }
    format!("must have at least one{modifier} sample")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_list_parses() {
        let samples = parse_samples("colors", "# just colors\n\nred\ngreen\nblue\n").unwrap();
        assert!(!samples.has_gender());
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn gendered_file_with_rarity() {
        let content = "#Name, GENDER, RARITY\nArthur, M,\nBeth, F,\nChris, ,\nZed, M, 5\n";
        let samples = parse_samples("names", content).unwrap();
        assert!(samples.has_gender());
        assert!(samples.has_non_rare());
    }

    #[test]
    fn rarity_out_of_range_fails() {
        let content = "#Name, RARITY\ncommon,\nweird, 100\n";
        let result = parse_samples("things", content);
        assert!(matches!(result, Err(SchemaError::Samples { .. })));
    }

    #[test]
    fn all_rare_set_is_rejected() {
        let content = "#Name, RARITY\nonly, 50\n";
        let result = parse_samples("things", content);
        assert!(matches!(result, Err(SchemaError::Samples { .. })));
    }

    #[test]
    fn missing_female_non_rare_is_rejected() {
        let content = "#Name, GENDER\nArthur, M\n";
        let result = parse_samples("names", content);
        assert!(matches!(result, Err(SchemaError::Samples { .. })));
    }

    #[test]
    fn bad_header_column_fails() {
        let content = "#Name, WEIGHT\nx, 1\n";
        let result = parse_samples("names", content);
        assert!(matches!(result, Err(SchemaError::Samples { .. })));
    }

    #[test]
    fn file_source_loads_and_lists_sets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("firstnames"),
            "#Name, GENDER\nArthur, M\nBeth, F\n",
        )
        .unwrap();

        let source = FileSampleSource::new(dir.path());
        assert_eq!(source.sample_names().unwrap(), vec!["firstnames"]);
        assert_eq!(source.load("firstnames").unwrap().len(), 2);
        assert!(matches!(
            source.load("missing"),
            Err(SchemaError::Samples { .. })
        ));
    }
}
