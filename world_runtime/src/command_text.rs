//! Line oriented command protocol used by the world server and tooling.
//!
//! Vectors are written as comma separated components without spaces, for
//! example `move scout 1,0 3` or `register scout 0,0,0 10 worker alice`.

use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::Action;

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("invalid float '{value}' for {context}: {source}")]
    InvalidFloat {
        value: String,
        context: &'static str,
        source: ParseFloatError,
    },
    #[error("invalid vector '{value}' for {context}: expected {expected} components")]
    InvalidVector {
        value: String,
        context: &'static str,
        expected: &'static str,
    },
}

/// Parsed form of one protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum TextCommand {
    Register {
        machine_id: String,
        position: Vec<f64>,
        life_value: Option<i64>,
        machine_type: Option<String>,
        owner: Option<String>,
    },
    Obstacle {
        obstacle_id: String,
        position: Vec<f64>,
        size: Option<f64>,
        obstacle_type: Option<String>,
    },
    Act {
        machine_id: String,
        action: Action,
    },
    View {
        machine_id: String,
    },
    Info {
        machine_id: String,
    },
    Remove {
        machine_id: String,
    },
    RemoveObstacle {
        obstacle_id: String,
    },
    Visible {
        owner: String,
    },
    Machines,
    Obstacles,
    Reset,
    Save,
    Load,
}

pub fn parse_command_line(input: &str) -> Result<TextCommand, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "register" => {
            let machine_id = required(parts.next(), "machine id")?;
            let position_str = required(parts.next(), "position")?;
            let position = parse_vector(&position_str, "register position", 2, 3)?;
            let life_value = parts
                .next()
                .map(|value| parse_i64(value, "register life"))
                .transpose()?;
            Ok(TextCommand::Register {
                machine_id,
                position,
                life_value,
                machine_type: parts.next().map(str::to_string),
                owner: parts.next().map(str::to_string),
            })
        }
        "obstacle" => {
            let obstacle_id = required(parts.next(), "obstacle id")?;
            let position_str = required(parts.next(), "position")?;
            let position = parse_vector(&position_str, "obstacle position", 2, 3)?;
            let size = parts
                .next()
                .map(|value| parse_f64(value, "obstacle size"))
                .transpose()?;
            Ok(TextCommand::Obstacle {
                obstacle_id,
                position,
                size,
                obstacle_type: parts.next().map(str::to_string),
            })
        }
        "move" => {
            let machine_id = required(parts.next(), "machine id")?;
            let direction_str = required(parts.next(), "direction")?;
            let components = parse_vector(&direction_str, "move direction", 2, 3)?;
            let distance = parse_f64(parts.next().unwrap_or("1"), "move distance")?;
            let direction = [
                components[0],
                components[1],
                components.get(2).copied().unwrap_or(0.0),
            ];
            Ok(TextCommand::Act {
                machine_id,
                action: Action::Move {
                    direction,
                    distance,
                },
            })
        }
        "attack" => {
            let machine_id = required(parts.next(), "machine id")?;
            let damage = parse_i64(parts.next().unwrap_or("1"), "attack damage")?;
            Ok(TextCommand::Act {
                machine_id,
                action: Action::Attack { damage },
            })
        }
        "turn" => {
            let machine_id = required(parts.next(), "machine id")?;
            let direction_str = required(parts.next(), "direction")?;
            let components = parse_vector(&direction_str, "turn direction", 2, 2)?;
            Ok(TextCommand::Act {
                machine_id,
                action: Action::Turn {
                    direction: [components[0], components[1]],
                },
            })
        }
        "view" => Ok(TextCommand::View {
            machine_id: required(parts.next(), "machine id")?,
        }),
        "info" => Ok(TextCommand::Info {
            machine_id: required(parts.next(), "machine id")?,
        }),
        "remove" => Ok(TextCommand::Remove {
            machine_id: required(parts.next(), "machine id")?,
        }),
        "remove_obstacle" => Ok(TextCommand::RemoveObstacle {
            obstacle_id: required(parts.next(), "obstacle id")?,
        }),
        "visible" => Ok(TextCommand::Visible {
            owner: required(parts.next(), "owner")?,
        }),
        "machines" => Ok(TextCommand::Machines),
        "obstacles" => Ok(TextCommand::Obstacles),
        "reset" => Ok(TextCommand::Reset),
        "save" => Ok(TextCommand::Save),
        "load" => Ok(TextCommand::Load),
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn required(part: Option<&str>, name: &'static str) -> Result<String, CommandParseError> {
    part.map(str::to_string)
        .ok_or(CommandParseError::MissingArgument(name))
}

fn parse_i64(value: &str, context: &'static str) -> Result<i64, CommandParseError> {
    value
        .parse::<i64>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_f64(value: &str, context: &'static str) -> Result<f64, CommandParseError> {
    value
        .parse::<f64>()
        .map_err(|source| CommandParseError::InvalidFloat {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_vector(
    value: &str,
    context: &'static str,
    min: usize,
    max: usize,
) -> Result<Vec<f64>, CommandParseError> {
    let components = value
        .split(',')
        .map(|component| parse_f64(component, context))
        .collect::<Result<Vec<_>, _>>()?;
    if components.len() < min || components.len() > max {
        return Err(CommandParseError::InvalidVector {
            value: value.to_string(),
            context,
            expected: if min == max { "2" } else { "2 or 3" },
        });
    }
    Ok(components)
}
