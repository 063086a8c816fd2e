use chrono::Utc;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::retention::{RetentionPolicy, TelemetryPolicies};
use crate::world::{WorldState, WorldStateAggregator};

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_policy(name: &str) -> PyResult<RetentionPolicy> {
    name.parse().map_err(value_error)
}

/// Snapshot of a connection's world state.
#[pyclass(name = "WorldState", frozen)]
struct PyWorldState {
    inner: WorldState,
}

#[pymethods]
impl PyWorldState {
    #[getter]
    fn has_begun(&self) -> bool {
        self.inner.has_begun
    }

    #[getter]
    fn is_running(&self) -> bool {
        self.inner.is_running
    }

    #[getter]
    fn number_of_observations_since_last_state(&self) -> usize {
        self.inner.observations_since_last_state
    }

    #[getter]
    fn number_of_rewards_since_last_state(&self) -> usize {
        self.inner.rewards_since_last_state
    }

    #[getter]
    fn number_of_video_frames_since_last_state(&self) -> usize {
        self.inner.video_frames_since_last_state
    }

    #[getter]
    fn observations(&self) -> Vec<String> {
        self.inner.observations.iter().map(|o| o.text.clone()).collect()
    }

    /// Each reward as `(dimension, value)` pairs.
    #[getter]
    fn rewards(&self) -> Vec<Vec<(usize, f64)>> {
        self.inner
            .rewards
            .iter()
            .map(|r| r.dimensions().collect())
            .collect()
    }

    #[getter]
    fn mission_control_messages(&self) -> Vec<String> {
        self.inner
            .control_messages
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    #[getter]
    fn errors(&self) -> Vec<String> {
        self.inner.error_texts()
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(value_error)
    }

    fn __repr__(&self) -> String {
        self.inner.to_string()
    }
}

/// Thread-safe telemetry aggregator for one connection.
#[pyclass(name = "WorldStateAggregator", frozen)]
struct PyWorldStateAggregator {
    inner: WorldStateAggregator,
}

#[pymethods]
impl PyWorldStateAggregator {
    #[new]
    #[pyo3(signature = (video = "latest_only", rewards = "sum", observations = "latest_only"))]
    fn new(video: &str, rewards: &str, observations: &str) -> PyResult<Self> {
        let policies = TelemetryPolicies::default()
            .with_video(parse_policy(video)?)
            .with_rewards(parse_policy(rewards)?)
            .with_observations(parse_policy(observations)?);
        let inner = WorldStateAggregator::with_policies(policies).map_err(value_error)?;
        Ok(Self { inner })
    }

    fn on_observation(&self, text: String) {
        self.inner.sink().on_observation(Utc::now(), text);
    }

    fn on_reward(&self, text: &str) {
        self.inner.sink().on_reward_text(Utc::now(), text);
    }

    fn on_control(&self, text: String) {
        self.inner.sink().on_control(Utc::now(), text);
    }

    fn on_error(&self, text: String) {
        self.inner.sink().on_error(Utc::now(), text);
    }

    fn peek(&self) -> PyWorldState {
        PyWorldState {
            inner: self.inner.peek(),
        }
    }

    fn take(&self) -> PyWorldState {
        PyWorldState {
            inner: self.inner.take(),
        }
    }

    fn reset(&self) {
        self.inner.reset();
    }
}

/// The name of this function must match the lib.name in Cargo.toml
#[pymodule]
fn mission_host(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyWorldState>()?;
    m.add_class::<PyWorldStateAggregator>()?;
    Ok(())
}
