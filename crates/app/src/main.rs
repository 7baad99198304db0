//! Entry point for the `strata` OBJ import tool.
//! Imports an OBJ file into a fresh scene, optionally sets up rigid bodies,
//! evaluates the scene and writes the physics settings out as RON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use asset::ObjImportParams;
use asset::importer::DEFAULT_COLLECTION_NAME;
use corelib::depsgraph::Depsgraph;
use corelib::rigidbody::BodyType;
use corelib::scene::Main;

fn parse_input_arg() -> Option<PathBuf> {
    // --input=<path>, or the first positional argument
    let mut positional = None;
    for arg in std::env::args().skip(1) {
        if let Some(val) = arg.strip_prefix("--input=") {
            return Some(PathBuf::from(val));
        }
        if positional.is_none() && !arg.starts_with("--") {
            positional = Some(PathBuf::from(arg));
        }
    }
    positional
}

fn parse_collection_arg() -> String {
    for arg in std::env::args() {
        if let Some(val) = arg.strip_prefix("--collection=") {
            if !val.trim().is_empty() {
                return val.trim().to_string();
            }
        }
    }
    DEFAULT_COLLECTION_NAME.to_string()
}

fn parse_flag_arg(name: &str) -> bool {
    // --<name>[=on|off], off by default
    let bare = format!("--{name}");
    let prefix = format!("--{name}=");
    for arg in std::env::args() {
        if arg == bare {
            return true;
        }
        if let Some(val) = arg.strip_prefix(&prefix) {
            return matches!(
                val.to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            );
        }
    }
    false
}

fn parse_rigidbody_arg() -> Option<BodyType> {
    // --rigidbody=off|active|passive
    for arg in std::env::args() {
        if let Some(val) = arg.strip_prefix("--rigidbody=") {
            return match val.to_ascii_lowercase().as_str() {
                "active" => Some(BodyType::Active),
                "passive" => Some(BodyType::Passive),
                "off" | "none" => None,
                other => {
                    log::warn!("Unknown rigid-body type '{}', leaving bodies off.", other);
                    None
                }
            };
        }
    }
    None
}

fn parse_save_physics_arg() -> Option<PathBuf> {
    std::env::args()
        .find_map(|arg| arg.strip_prefix("--save-physics=").map(PathBuf::from))
}

fn print_usage() {
    eprintln!(
        "usage: strata <file.obj> [--collection=<name>] [--dump] \
         [--rigidbody=off|active|passive] [--evaluate] [--save-physics=<file.ron>]"
    );
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(input) = parse_input_arg() else {
        print_usage();
        anyhow::bail!("No OBJ file given");
    };
    let params = ObjImportParams {
        filepath: input,
        collection_name: parse_collection_arg(),
        print_data: parse_flag_arg("dump"),
    };
    let body_type = parse_rigidbody_arg();
    let evaluate = parse_flag_arg("evaluate");
    let save_physics = parse_save_physics_arg();
    log::info!(
        "Starting strata. input={}, collection='{}', dump={}, rigidbody={:?}, evaluate={}",
        params.filepath.display(),
        params.collection_name,
        params.print_data,
        body_type,
        evaluate
    );

    let mut main = Main::new();
    let report = asset::importer_main(&mut main, &params)?;

    if let Some(body_type) = body_type {
        for id in &report.objects {
            main.add_rigidbody_object(*id, body_type)?;
        }
        log::info!(
            "Added {:?} rigid bodies to {} object(s)",
            body_type,
            report.objects.len()
        );
    }

    if evaluate {
        let stats = Depsgraph::new().evaluate(&mut main);
        log::info!(
            "Evaluated scene: {} operations run, {} stubbed, {} failed",
            stats.executed,
            stats.stubbed,
            stats.failed
        );
    }

    for id in &report.objects {
        let ob = main.object(*id)?;
        match ob.data.as_mesh().and_then(|m| m.bounds().map(|b| (m, b))) {
            Some((mesh, (min, max))) => log::info!(
                "  {}: {} verts, {} faces, bounds {:?}..{:?}",
                ob.name,
                mesh.vertices.len(),
                mesh.polys.len(),
                min,
                max
            ),
            None => log::info!("  {}: empty", ob.name),
        }
    }

    if let Some(path) = save_physics {
        main.export_physics()
            .save(&path)
            .with_context(|| format!("Failed to save physics settings to {}", path.display()))?;
    }

    log::info!("Done.");
    Ok(())
}
