use serde::{Deserialize, Serialize};

use super::errors::TelemetryError;
use super::types::Timestamp;

pub const MAX_REWARD_DIMENSIONS: usize = 4;

/// Reward on up to [`MAX_REWARD_DIMENSIONS`] dimensions. Dimension 0 is the
/// primary reward; a dimension that was never reported is absent rather than
/// zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardVector {
    pub timestamp: Timestamp,
    values: [Option<f64>; MAX_REWARD_DIMENSIONS],
}

impl RewardVector {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            values: [None; MAX_REWARD_DIMENSIONS],
        }
    }

    /// A reward on dimension 0 only.
    pub fn primary(timestamp: Timestamp, value: f64) -> Self {
        let mut reward = Self::new(timestamp);
        reward.values[0] = Some(value);
        reward
    }

    /// Dimensions `0..values.len()`.
    pub fn from_values(timestamp: Timestamp, values: &[f64]) -> Result<Self, TelemetryError> {
        let mut reward = Self::new(timestamp);
        for (dimension, value) in values.iter().enumerate() {
            reward.set(dimension, *value)?;
        }
        Ok(reward)
    }

    /// Parses the `"<dim>:<value>,<dim>:<value>"` form used on the reward
    /// stream.
    pub fn parse(timestamp: Timestamp, text: &str) -> Result<Self, TelemetryError> {
        let mut reward = Self::new(timestamp);
        for token in text.split(',') {
            let (dimension, value) = token
                .split_once(':')
                .ok_or_else(|| TelemetryError::MalformedReward(text.to_string()))?;
            let dimension: usize = dimension
                .trim()
                .parse()
                .map_err(|_| TelemetryError::MalformedReward(text.to_string()))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| TelemetryError::MalformedReward(text.to_string()))?;
            reward.set(dimension, value)?;
        }
        Ok(reward)
    }

    pub fn set(&mut self, dimension: usize, value: f64) -> Result<(), TelemetryError> {
        let slot = self
            .values
            .get_mut(dimension)
            .ok_or(TelemetryError::DimensionOutOfRange {
                dimension,
                max: MAX_REWARD_DIMENSIONS,
            })?;
        *slot = Some(value);
        Ok(())
    }

    pub fn value(&self) -> Option<f64> {
        self.values[0]
    }

    pub fn value_on(&self, dimension: usize) -> Option<f64> {
        self.values.get(dimension).copied().flatten()
    }

    pub fn has_value_on(&self, dimension: usize) -> bool {
        self.value_on(dimension).is_some()
    }

    /// Present dimensions in ascending order.
    pub fn dimensions(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(dimension, value)| value.map(|v| (dimension, v)))
    }

    pub fn dimension_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.dimension_count() == 0
    }

    /// Dimension-wise sum. A dimension absent from `other` leaves ours as is; a
    /// dimension absent from ours takes `other`'s value.
    pub fn add(&mut self, other: &RewardVector) {
        for (dimension, value) in other.dimensions() {
            let slot = &mut self.values[dimension];
            *slot = Some(slot.unwrap_or(0.0) + value);
        }
    }

    pub fn to_simple_string(&self) -> String {
        self.dimensions()
            .map(|(dimension, value)| format!("{dimension}:{value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_parse_simple_string() {
        let reward = RewardVector::parse(Utc::now(), "0:1.5,2:-3").unwrap();
        assert_eq!(reward.value(), Some(1.5));
        assert_eq!(reward.value_on(1), None);
        assert_eq!(reward.value_on(2), Some(-3.0));
        assert_eq!(reward.dimension_count(), 2);
        assert_eq!(reward.to_simple_string(), "0:1.5,2:-3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            RewardVector::parse(Utc::now(), "1.5"),
            Err(TelemetryError::MalformedReward(_))
        ));
        assert!(matches!(
            RewardVector::parse(Utc::now(), "x:1"),
            Err(TelemetryError::MalformedReward(_))
        ));
        assert!(matches!(
            RewardVector::parse(Utc::now(), "7:1"),
            Err(TelemetryError::DimensionOutOfRange { dimension: 7, .. })
        ));
    }

    #[test]
    fn test_add_treats_missing_dimensions_as_absent() {
        let now = Utc::now();
        let mut total = RewardVector::from_values(now, &[1.0, 2.0]).unwrap();
        let mut longer = RewardVector::new(now);
        longer.set(0, 0.5).unwrap();
        longer.set(3, 4.0).unwrap();

        total.add(&longer);

        assert_eq!(total.value(), Some(1.5));
        assert_eq!(total.value_on(1), Some(2.0));
        assert_eq!(total.value_on(2), None);
        assert_eq!(total.value_on(3), Some(4.0));
    }

    #[test]
    fn test_value_on_out_of_range_is_none() {
        let reward = RewardVector::primary(Utc::now(), 1.0);
        assert_eq!(reward.value_on(MAX_REWARD_DIMENSIONS), None);
        assert!(!reward.has_value_on(9));
    }
}
