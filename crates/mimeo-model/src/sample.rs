use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Gender attached to a sample or a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Neutral,
}

impl Gender {
    /// Parses the one-letter code used in samples files and templates.
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "M" => Some(Self::Male),
            "F" => Some(Self::Female),
            _ => None,
        }
    }
}

/// One line of a samples file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: String,
    pub gender: Gender,
    /// 0 means not rare; 1-99 is the percent chance the sample survives
    /// being picked.
    pub rarity: u8,
}

impl Sample {
    pub fn new(value: impl Into<String>, gender: Gender, rarity: u8) -> Self {
        Self {
            value: value.into(),
            gender,
            rarity,
        }
    }
}

/// The full data set from one samples file.
///
/// Gendered sets keep two lists; neutral samples go in both so either
/// gender can draw them.
#[derive(Debug, Clone)]
pub struct Samples {
    name: String,
    has_gender: bool,
    samples: Vec<Sample>,
    female: Vec<Sample>,
}

impl Samples {
    pub fn new(name: impl Into<String>, has_gender: bool) -> Self {
        Self {
            name: name.into(),
            has_gender,
            samples: Vec::new(),
            female: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_gender(&self) -> bool {
        self.has_gender
    }

    pub fn len(&self) -> usize {
        self.samples.len() + self.female.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.female.is_empty()
    }

    pub fn add(&mut self, sample: Sample) -> Result<()> {
        if !self.has_gender && sample.gender != Gender::Neutral {
            return Err(ModelError::BadSample {
                name: self.name.clone(),
                reason: "cannot add a gendered sample to a non-gendered set".into(),
            });
        }

        if self.has_gender {
            if matches!(sample.gender, Gender::Male | Gender::Neutral) {
                self.samples.push(sample.clone());
            }
            if matches!(sample.gender, Gender::Female | Gender::Neutral) {
                self.female.push(sample);
            }
        } else {
            self.samples.push(sample);
        }

        Ok(())
    }

    /// True when each eligible gender has at least one non-rare entry,
    /// which guarantees `pick` always terminates.
    pub fn has_non_rare(&self) -> bool {
        let male_ok = self.samples.iter().any(|s| s.rarity == 0);
        if self.has_gender {
            male_ok && self.female.iter().any(|s| s.rarity == 0)
        } else {
            male_ok
        }
    }

    /// Picks a random sample, honoring gender and rarity. Asking for a
    /// gender on a non-gendered set is an error; asking for no gender on
    /// a gendered set picks one at random.
    pub fn pick<R: Rng>(&self, gender: Gender, rng: &mut R) -> Result<&Sample> {
        if !self.has_gender && gender != Gender::Neutral {
            return Err(ModelError::BadSample {
                name: self.name.clone(),
                reason: "cannot pick a gendered sample from a non-gendered set".into(),
            });
        }

        let gender = if self.has_gender && gender == Gender::Neutral {
            if rng.random_bool(0.5) {
                Gender::Male
            } else {
                Gender::Female
            }
        } else {
            gender
        };

        let pool = if self.has_gender && gender == Gender::Female {
            &self.female
        } else {
            &self.samples
        };

        if pool.is_empty() {
            return Err(ModelError::BadSample {
                name: self.name.clone(),
                reason: "sample set is empty".into(),
            });
        }

        // Rejected rare samples are removed from the candidate list so
        // the loop terminates as long as one non-rare sample exists.
        let mut candidates: Vec<usize> = (0..pool.len()).collect();
        loop {
            let pick = rng.random_range(0..candidates.len());
            let sample = &pool[candidates[pick]];

            if sample.rarity > 0 && rng.random_range(0..100) >= sample.rarity {
                candidates.swap_remove(pick);
                continue;
            }

            return Ok(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn gendered_set() -> Samples {
        let mut set = Samples::new("names", true);
        set.add(Sample::new("Arthur", Gender::Male, 0)).unwrap();
        set.add(Sample::new("Beth", Gender::Female, 0)).unwrap();
        set.add(Sample::new("Chris", Gender::Neutral, 0)).unwrap();
        set
    }

    #[test]
    fn neutral_samples_serve_both_genders() {
        let set = gendered_set();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..50 {
            let male = set.pick(Gender::Male, &mut rng).unwrap();
            assert!(male.value == "Arthur" || male.value == "Chris");
            let female = set.pick(Gender::Female, &mut rng).unwrap();
            assert!(female.value == "Beth" || female.value == "Chris");
        }
    }

    #[test]
    fn gendered_pick_from_neutral_set_fails() {
        let mut set = Samples::new("colors", false);
        set.add(Sample::new("red", Gender::Neutral, 0)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = set.pick(Gender::Female, &mut rng);
        assert!(matches!(result, Err(ModelError::BadSample { .. })));
    }

    #[test]
    fn rare_samples_appear_less_often() {
        let mut set = Samples::new("surnames", false);
        set.add(Sample::new("common", Gender::Neutral, 0)).unwrap();
        set.add(Sample::new("rare", Gender::Neutral, 5)).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut rare_hits = 0;
        for _ in 0..1000 {
            if set.pick(Gender::Neutral, &mut rng).unwrap().value == "rare" {
                rare_hits += 1;
            }
        }

        // ~2.5% expected; anything near half would mean rarity is ignored.
        assert!(rare_hits > 0 && rare_hits < 150, "rare_hits = {rare_hits}");
    }

    #[test]
    fn non_rare_guarantee_checks_both_lists() {
        let mut set = Samples::new("names", true);
        set.add(Sample::new("Arthur", Gender::Male, 0)).unwrap();
        set.add(Sample::new("Beth", Gender::Female, 10)).unwrap();
        assert!(!set.has_non_rare());
        set.add(Sample::new("Carol", Gender::Female, 0)).unwrap();
        assert!(set.has_non_rare());
    }
}
