use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use world_core::{
    load_world_config_from_env, JsonFileStorage, MachineSpec, ObstacleSpec, WorldEngine,
    WorldError,
};
use world_runtime::{parse_command_line, TextCommand};

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, source) = load_world_config_from_env();
    let bind = config.command_bind;
    let storage = Arc::new(JsonFileStorage::new(config.save_path.clone()));
    let engine = Arc::new(WorldEngine::with_storage(config, storage));
    engine.start();

    let listener = TcpListener::bind(bind)?;
    info!(
        target: "grid_world::server",
        command_bind = %bind,
        config = ?source,
        machines = engine.machines().len(),
        obstacles = engine.obstacles().len(),
        "Grid world server ready"
    );

    accept_loop(listener, engine);
    Ok(())
}

fn accept_loop(listener: TcpListener, engine: Arc<WorldEngine>) {
    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!(target: "grid_world::server", %addr, "client.connected");
                let engine = Arc::clone(&engine);
                thread::spawn(move || handle_client(stream, addr, &engine));
            }
            Err(err) => {
                warn!(target: "grid_world::server", error = %err, "client.accept_failed");
                thread::sleep(Duration::from_millis(200));
            }
        }
    }
}

fn handle_client(stream: TcpStream, addr: SocketAddr, engine: &WorldEngine) {
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(err) => {
            warn!(target: "grid_world::server", %addr, error = %err, "client.clone_failed");
            return;
        }
    };
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let reply = respond(engine, trimmed);
                if let Err(err) = writeln!(writer, "{reply}") {
                    warn!(target: "grid_world::server", %addr, error = %err, "client.write_failed");
                    break;
                }
            }
            Err(err) => {
                warn!(target: "grid_world::server", %addr, error = %err, "client.read_failed");
                break;
            }
        }
    }
    info!(target: "grid_world::server", %addr, "client.disconnected");
}

/// One JSON reply line per request line.
fn respond(engine: &WorldEngine, input: &str) -> Value {
    let command = match parse_command_line(input) {
        Ok(command) => command,
        Err(err) => {
            warn!(target: "grid_world::server", input, error = %err, "command.invalid");
            return json!({ "ok": false, "error": err.to_string() });
        }
    };
    match apply(engine, command) {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(err) => {
            let hits = match &err {
                WorldError::Collision { hits, .. } => to_value(hits),
                _ => Value::Null,
            };
            json!({ "ok": false, "error": err.to_string(), "collisions": hits })
        }
    }
}

fn apply(engine: &WorldEngine, command: TextCommand) -> Result<Value, WorldError> {
    let value = match command {
        TextCommand::Register {
            machine_id,
            position,
            life_value,
            machine_type,
            owner,
        } => to_value(&engine.register_machine(MachineSpec {
            machine_id,
            position,
            life_value,
            machine_type,
            owner,
            ..MachineSpec::default()
        })?),
        TextCommand::Obstacle {
            obstacle_id,
            position,
            size,
            obstacle_type,
        } => to_value(&engine.register_obstacle(ObstacleSpec {
            obstacle_id,
            position,
            size,
            obstacle_type,
        })?),
        TextCommand::Act { machine_id, action } => {
            to_value(&engine.submit_command(&machine_id, action)?)
        }
        TextCommand::View { machine_id } => {
            let view = engine.view(&machine_id)?;
            json!({ "ascii": view.to_ascii(), "view": view })
        }
        TextCommand::Info { machine_id } => to_value(
            &engine
                .machine(&machine_id)
                .ok_or_else(|| WorldError::machine_not_found(machine_id))?,
        ),
        TextCommand::Remove { machine_id } => to_value(&engine.remove_machine(&machine_id)?),
        TextCommand::RemoveObstacle { obstacle_id } => {
            to_value(&engine.remove_obstacle(&obstacle_id)?)
        }
        TextCommand::Visible { owner } => to_value(&engine.visible_to_owner(&owner)),
        TextCommand::Machines => to_value(&engine.machines()),
        TextCommand::Obstacles => to_value(&engine.obstacles()),
        TextCommand::Reset => to_value(&engine.reset()),
        TextCommand::Save => to_value(&engine.save()?),
        TextCommand::Load => json!({ "restored": engine.load()? }),
    };
    Ok(value)
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| json!({ "encode_error": err.to_string() }))
}
