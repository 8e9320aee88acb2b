//! Time-of-year adjustment

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};

use crate::domain::{CategoryId, ProductAttributes};
use crate::errors::DomainError;

use super::weights::BlendWeights;
use super::{DEFAULT_SEASONAL_DECAY_STEP, DEFAULT_SEASONAL_FLOOR, SEASONAL_NEUTRAL_SCORE};

/// Produce categories and their in-season months, used when no table is
/// configured.
pub const BUILTIN_SEASONS: &[(&str, &[u32])] = &[
    ("apple", &[9, 10, 11]),
    ("asparagus", &[4, 5, 6]),
    ("blueberry", &[6, 7, 8]),
    ("cabbage", &[10, 11, 12, 1]),
    ("cherry", &[5, 6, 7]),
    ("citrus", &[12, 1, 2, 3]),
    ("corn", &[7, 8, 9]),
    ("grape", &[8, 9, 10]),
    ("peach", &[6, 7, 8]),
    ("pear", &[8, 9, 10]),
    ("pumpkin", &[9, 10, 11]),
    ("strawberry", &[4, 5, 6]),
    ("tomato", &[6, 7, 8, 9]),
    ("watermelon", &[6, 7, 8]),
];

/// Category to in-season months lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeasonTable {
    months: HashMap<CategoryId, BTreeSet<u32>>,
}

impl SeasonTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (category, months) in BUILTIN_SEASONS {
            table
                .months
                .insert(CategoryId::new(*category), months.iter().copied().collect());
        }
        table
    }

    /// Build from a plain mapping, validating every month.
    pub fn from_map(entries: &BTreeMap<String, Vec<u32>>) -> Result<Self, DomainError> {
        let mut table = Self::new();
        for (category, months) in entries {
            table.insert(category.clone(), months.iter().copied())?;
        }
        Ok(table)
    }

    pub fn insert<I>(&mut self, category: impl Into<String>, months: I) -> Result<(), DomainError>
    where
        I: IntoIterator<Item = u32>,
    {
        let category = category.into();
        let mut set = BTreeSet::new();
        for month in months {
            if !(1..=12).contains(&month) {
                return Err(DomainError::InvalidSeasonMonth { category, month });
            }
            set.insert(month);
        }
        self.months.insert(CategoryId(category), set);
        Ok(())
    }

    /// In-season months for a category. Categories mapped to an empty month
    /// set are reported as unknown.
    pub fn in_season_months(&self, category: &CategoryId) -> Option<&BTreeSet<u32>> {
        self.months.get(category).filter(|months| !months.is_empty())
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

/// Scores how in-season a product is at a given instant and blends that into
/// a base relevance score.
#[derive(Debug, Clone)]
pub struct SeasonalAdjuster {
    table: Arc<SeasonTable>,
    decay_step: f64,
    floor: f64,
    blend: BlendWeights,
}

impl SeasonalAdjuster {
    pub fn new(table: SeasonTable) -> Self {
        Self {
            table: Arc::new(table),
            decay_step: DEFAULT_SEASONAL_DECAY_STEP,
            floor: DEFAULT_SEASONAL_FLOOR,
            blend: BlendWeights::default(),
        }
    }

    /// Swap the season table, keeping decay and blend settings.
    pub fn with_table(mut self, table: SeasonTable) -> Self {
        self.table = Arc::new(table);
        self
    }

    pub fn with_decay(mut self, decay_step: f64, floor: f64) -> Result<Self, DomainError> {
        if !(decay_step.is_finite() && decay_step > 0.0 && decay_step <= 1.0) {
            return Err(DomainError::InvariantViolation(format!(
                "seasonal decay step must be in (0, 1], got {decay_step}"
            )));
        }
        // Raising the floor is allowed; lowering it would let scores leave [0.2, 1].
        if !(floor.is_finite() && (DEFAULT_SEASONAL_FLOOR..=1.0).contains(&floor)) {
            return Err(DomainError::InvariantViolation(format!(
                "seasonal floor must be in [{DEFAULT_SEASONAL_FLOOR}, 1], got {floor}"
            )));
        }
        self.decay_step = decay_step;
        self.floor = floor;
        Ok(self)
    }

    pub fn with_blend(mut self, blend: BlendWeights) -> Result<Self, DomainError> {
        blend.validate()?;
        self.blend = blend;
        Ok(self)
    }

    pub fn blend_weights(&self) -> BlendWeights {
        self.blend
    }

    pub fn table(&self) -> &SeasonTable {
        &self.table
    }

    /// Seasonal score in `[floor, 1.0]`.
    ///
    /// Products without a category, or whose category has no known season,
    /// are neutral (1.0). Off-season products lose `decay_step` per month of
    /// forward distance to the next in-season month.
    pub fn seasonal_score(&self, product: &ProductAttributes, at: DateTime<Utc>) -> f64 {
        let Some(months) =
            product.category_id.as_ref().and_then(|category| self.table.in_season_months(category))
        else {
            return SEASONAL_NEUTRAL_SCORE;
        };

        let current = at.month();
        let Some(distance) = months.iter().map(|month| forward_distance(current, *month)).min()
        else {
            return SEASONAL_NEUTRAL_SCORE;
        };

        if distance == 0 {
            return SEASONAL_NEUTRAL_SCORE;
        }

        (1.0 - self.decay_step * f64::from(distance)).max(self.floor)
    }

    /// `base × blend.base + seasonal × blend.seasonal`
    pub fn blend(&self, base: f64, seasonal: f64) -> f64 {
        self.blend.base * base + self.blend.seasonal * seasonal
    }
}

impl Default for SeasonalAdjuster {
    fn default() -> Self {
        Self::new(SeasonTable::builtin())
    }
}

/// Months to move forward from `from` to reach `to`, wrapping at 12.
fn forward_distance(from: u32, to: u32) -> u32 {
    (to + 12 - from) % 12
}
