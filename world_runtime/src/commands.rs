use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Action names accepted on the loosely typed submission path.
pub const ACTION_NAMES: [&str; 3] = ["move", "attack", "turn"];

/// Supported machine actions with their typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Move { direction: [f64; 3], distance: f64 },
    Attack { damage: i64 },
    Turn { direction: [f64; 2] },
}

/// A queued request to run `action` against one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub machine_id: String,
    pub action: Action,
}

impl Command {
    pub fn new(machine_id: impl Into<String>, action: Action) -> Self {
        Self {
            machine_id: machine_id.into(),
            action,
        }
    }
}

/// Error returned when a free-form parameter map cannot be turned into an
/// [`Action`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionParseError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl Action {
    pub fn move_towards(direction: [f64; 3], distance: f64) -> Self {
        Action::Move {
            direction,
            distance,
        }
    }

    pub fn attack(damage: i64) -> Self {
        Action::Attack { damage }
    }

    pub fn turn(direction: [f64; 2]) -> Self {
        Action::Turn { direction }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Attack { .. } => "attack",
            Action::Turn { .. } => "turn",
        }
    }

    /// Build an action from its name and a JSON parameter map. Missing
    /// parameters fall back to the defaults commanders rely on: move one cell
    /// east, attack for one point, turn east.
    pub fn from_params(action: &str, params: &Map<String, Value>) -> Result<Self, ActionParseError> {
        match action.to_ascii_lowercase().as_str() {
            "move" => {
                let direction = match params.get("direction") {
                    Some(value) => spatial_vector(value, "direction")?,
                    None => [1.0, 0.0, 0.0],
                };
                let distance = match params.get("distance") {
                    Some(value) => non_negative_number(value, "distance")?,
                    None => 1.0,
                };
                Ok(Action::Move {
                    direction,
                    distance,
                })
            }
            "attack" => {
                let damage = match params.get("damage") {
                    Some(value) => damage(value)?,
                    None => 1,
                };
                Ok(Action::Attack { damage })
            }
            "turn" => {
                let direction = match params.get("direction") {
                    Some(value) => {
                        let [x, y, _] = spatial_vector(value, "direction")?;
                        [x, y]
                    }
                    None => [1.0, 0.0],
                };
                Ok(Action::Turn { direction })
            }
            other => Err(ActionParseError::UnknownAction(other.to_string())),
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ActionParseError {
    ActionParseError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

fn spatial_vector(value: &Value, name: &'static str) -> Result<[f64; 3], ActionParseError> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(name, "expected an array of 2 or 3 numbers"))?;
    let mut components = Vec::with_capacity(items.len());
    for item in items {
        let number = item
            .as_f64()
            .filter(|number| number.is_finite())
            .ok_or_else(|| invalid(name, format!("component {item} is not a finite number")))?;
        components.push(number);
    }
    match *components.as_slice() {
        [x, y] => Ok([x, y, 0.0]),
        [x, y, z] => Ok([x, y, z]),
        _ => Err(invalid(
            name,
            format!("expected 2 or 3 components, got {}", components.len()),
        )),
    }
}

fn non_negative_number(value: &Value, name: &'static str) -> Result<f64, ActionParseError> {
    let number = value
        .as_f64()
        .ok_or_else(|| invalid(name, format!("{value} is not a number")))?;
    if !number.is_finite() || number < 0.0 {
        return Err(invalid(name, format!("{number} must be finite and >= 0")));
    }
    Ok(number)
}

fn damage(value: &Value) -> Result<i64, ActionParseError> {
    let amount = value
        .as_i64()
        .ok_or_else(|| invalid("damage", format!("{value} is not an integer")))?;
    if amount < 0 {
        return Err(invalid("damage", format!("{amount} must be >= 0")));
    }
    Ok(amount)
}
