use std::path::Path;

use json::JsonValue;
use nalgebra::Vector2;

use crate::{
    datatypes::{Constraint, NodeKey, DEFAULT_EDGE_DAMPING, DEFAULT_EDGE_RIGIDITY, DEFAULT_NODE_MASS},
    error::FeldsparError,
    leb::DEFAULT_ROOT_SIZE,
    mass_spring::MassSpringParams,
    sandbox::{Sandbox, SimulationMode},
};

/// How a scene should be run from the command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub mode: SimulationMode,
    pub ticks: usize,
    pub time_step: f64,
}

/// A sandbox built from a scene file, along with its run settings
#[derive(Debug)]
pub struct Scene {
    pub sandbox: Sandbox,
    pub settings: RunSettings,
}

fn read_f64(value: &JsonValue, field: &str, context: &str) -> Result<f64, FeldsparError> {
    match value[field].as_f64() {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(FeldsparError::Input(format!(
            "{context} has a missing or non-numeric {field} field"
        ))),
    }
}

fn optional_f64(
    value: &JsonValue,
    field: &str,
    default: f64,
    context: &str,
) -> Result<f64, FeldsparError> {
    if value.has_key(field) {
        read_f64(value, field, context)
    } else {
        Ok(default)
    }
}

fn optional_bool(value: &JsonValue, field: &str, context: &str) -> Result<bool, FeldsparError> {
    if !value.has_key(field) {
        return Ok(false);
    }
    value[field].as_bool().ok_or_else(|| {
        FeldsparError::Input(format!("{context} has a non-boolean {field} field"))
    })
}

/// Parses the settings section
///
/// # Arguments
/// * `scene_json` - The whole scene as a JsonValue object
fn parse_settings(scene_json: &JsonValue) -> Result<RunSettings, FeldsparError> {
    let settings = &scene_json["settings"];

    let mode = match settings["mode"].as_str() {
        Some("fem") => SimulationMode::Fem,
        Some("mass_spring") => SimulationMode::MassSpring,
        Some(other) => {
            return Err(FeldsparError::Input(format!(
                "Unknown simulation mode '{other}', expected fem or mass_spring"
            )))
        }
        None => {
            return Err(FeldsparError::Input(
                "Scene json missing mode field in settings section".to_owned(),
            ))
        }
    };

    let ticks = settings["ticks"].as_usize().ok_or_else(|| {
        FeldsparError::Input(
            "Scene json missing or non-integer ticks field in settings section".to_owned(),
        )
    })?;

    let time_step = read_f64(settings, "time_step", "settings section")?;
    if time_step <= 0.0 {
        return Err(FeldsparError::Input(format!(
            "time_step must be positive, got {time_step}"
        )));
    }

    Ok(RunSettings {
        mode,
        ticks,
        time_step,
    })
}

fn parse_mass_spring(scene_json: &JsonValue) -> Result<(MassSpringParams, f64, f64), FeldsparError> {
    let section = &scene_json["mass_spring"];
    let defaults = MassSpringParams::default();
    let context = "mass_spring section";

    let params = MassSpringParams {
        gravity: optional_f64(section, "gravity", defaults.gravity, context)?,
        drag: optional_f64(section, "drag", defaults.drag, context)?,
        bounciness: optional_f64(section, "bounciness", defaults.bounciness, context)?,
        floor_y: optional_f64(section, "floor_y", defaults.floor_y, context)?,
    };
    let rigidity = optional_f64(section, "rigidity", DEFAULT_EDGE_RIGIDITY, context)?;
    let damping = optional_f64(section, "damping", DEFAULT_EDGE_DAMPING, context)?;

    Ok((params, rigidity, damping))
}

/// Reads an array of node index tuples such as `[[0, 1], [1, 2]]`
fn parse_index_tuples<const N: usize>(
    scene_json: &JsonValue,
    field: &str,
    keys: &[NodeKey],
) -> Result<Vec<[NodeKey; N]>, FeldsparError> {
    let section = &scene_json[field];
    if section.is_null() {
        return Ok(Vec::new());
    }
    if !section.is_array() {
        return Err(FeldsparError::Input(format!(
            "Scene json {field} field must be an array"
        )));
    }

    let mut tuples = Vec::with_capacity(section.len());
    for (i, entry) in section.members().enumerate() {
        if !entry.is_array() || entry.len() != N {
            return Err(FeldsparError::Input(format!(
                "{field}[{i}] must be an array of {N} node indices"
            )));
        }

        let mut tuple = [NodeKey::default(); N];
        for (slot, index) in tuple.iter_mut().zip(entry.members()) {
            let index = index.as_usize().ok_or_else(|| {
                FeldsparError::Input(format!("{field}[{i}] has a non-integer node index"))
            })?;
            *slot = *keys.get(index).ok_or_else(|| {
                FeldsparError::Input(format!(
                    "{field}[{i}] refers to node {index} but there are only {} nodes",
                    keys.len()
                ))
            })?;
        }
        tuples.push(tuple);
    }

    Ok(tuples)
}

/// Builds a sandbox from scene json text
pub fn parse_scene(contents: &str) -> Result<Scene, FeldsparError> {
    let scene_json = json::parse(contents)
        .map_err(|err| FeldsparError::Input(format!("Error in scene json: {err}")))?;

    if !scene_json.has_key("settings") {
        return Err(FeldsparError::Input(
            "Scene json missing settings field".to_owned(),
        ));
    }
    if !scene_json.has_key("nodes") || !scene_json["nodes"].is_array() {
        return Err(FeldsparError::Input(
            "Scene json missing nodes array".to_owned(),
        ));
    }

    let settings = parse_settings(&scene_json)?;
    let (params, rigidity, damping) = parse_mass_spring(&scene_json)?;

    let mut sandbox = Sandbox::new(settings.mode).with_params(params);
    let graph = sandbox.graph_mut();

    let mut keys = Vec::with_capacity(scene_json["nodes"].len());
    for (i, node_json) in scene_json["nodes"].members().enumerate() {
        let context = format!("nodes[{i}]");
        let position = Vector2::new(
            read_f64(node_json, "x", &context)?,
            read_f64(node_json, "y", &context)?,
        );
        let constraint = Constraint::new(
            optional_bool(node_json, "constrained_x", &context)?,
            optional_bool(node_json, "constrained_y", &context)?,
        );
        let force = Vector2::new(
            optional_f64(node_json, "fx", 0.0, &context)?,
            optional_f64(node_json, "fy", 0.0, &context)?,
        );
        let mass = optional_f64(node_json, "mass", DEFAULT_NODE_MASS, &context)?;
        if mass <= 0.0 {
            return Err(FeldsparError::Input(format!(
                "{context} has non-positive mass {mass}"
            )));
        }

        let key = graph.add_node(position);
        graph.set_constraint(key, constraint)?;
        graph.set_nodal_force(key, force)?;
        if let Some(node) = graph.node_mut(key) {
            node.mass = mass;
        }
        keys.push(key);
    }

    for [a, b] in parse_index_tuples::<2>(&scene_json, "edges", &keys)? {
        graph.add_edge(a, b)?;
    }
    for [a, b, c] in parse_index_tuples::<3>(&scene_json, "elements", &keys)? {
        graph.add_element(a, b, c)?;
    }

    if scene_json.has_key("leb") {
        let leb_json = &scene_json["leb"];
        let root_size = optional_f64(leb_json, "root_size", DEFAULT_ROOT_SIZE, "leb section")?;
        sandbox.generate_leb(root_size)?;

        let subdivide = &leb_json["subdivide"];
        if !subdivide.is_null() && !subdivide.is_array() {
            return Err(FeldsparError::Input(
                "leb subdivide must be an array of paths".to_owned(),
            ));
        }
        for path in subdivide.members() {
            let path = path.as_str().ok_or_else(|| {
                FeldsparError::Input("leb subdivide entries must be strings".to_owned())
            })?;
            sandbox.subdivide_leb(path)?;
        }
    }

    let graph = sandbox.graph_mut();
    let edges: Vec<_> = graph.edges().keys().collect();
    for edge in edges {
        if let Some(edge) = graph.edge_mut(edge) {
            edge.rigidity = rigidity;
            edge.damping = damping;
        }
    }

    tracing::info!(
        "loaded scene with {} nodes, {} edges and {} elements",
        graph.node_count(),
        graph.edges().len(),
        graph.elements().len()
    );

    Ok(Scene { sandbox, settings })
}

/// Loads and parses a scene file
pub fn load_scene(path: &Path) -> Result<Scene, FeldsparError> {
    let contents = std::fs::read_to_string(path).map_err(|_err| {
        FeldsparError::Input(format!("Unable to open scene file {}", path.display()))
    })?;
    parse_scene(&contents)
}
