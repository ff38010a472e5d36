use std::{io::Write, path::Path};

use nalgebra::{DMatrix, DVector};

use crate::{
    datatypes::{Axis, DOF},
    element::cross_z,
    error::FeldsparError,
    graph::Graph,
};

/// Label for a global DOF, e.g. `d3x` for DOF 6
pub fn dof_label(dof: usize) -> String {
    match Axis::of_dof(dof) {
        (node, Axis::X) => format!("d{node}x"),
        (node, Axis::Y) => format!("d{node}y"),
    }
}

fn render(
    m: &DMatrix<f64>,
    row_labels: &[String],
    col_labels: &[String],
) -> String {
    let width = col_labels
        .iter()
        .map(String::len)
        .chain(m.iter().map(|x| format!("{x:.4}").len()))
        .max()
        .unwrap_or(0);
    let label_width = row_labels.iter().map(String::len).max().unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!("{:label_width$}", ""));
    for label in col_labels {
        out.push_str(&format!(" {label:>width$}"));
    }
    out.push('\n');

    for (r, label) in row_labels.iter().enumerate() {
        out.push_str(&format!("{label:label_width$}"));
        for c in 0..m.ncols() {
            out.push_str(&format!(" {:>width$.4}", m[(r, c)]));
        }
        out.push('\n');
    }

    out
}

/// Renders a matrix whose rows and columns are global DOFs. A trailing
/// column beyond the square part is labelled `F`.
pub fn format_matrix(m: &DMatrix<f64>) -> String {
    let mapping: Vec<usize> = (0..m.nrows()).collect();
    format_constrained(m, &mapping)
}

/// Renders a reduced matrix, labelling each row and column with the global
/// DOF it came from
pub fn format_constrained(m: &DMatrix<f64>, mapping: &[usize]) -> String {
    let row_labels: Vec<String> = mapping.iter().map(|&dof| dof_label(dof)).collect();
    let mut col_labels = row_labels.clone();
    if m.ncols() > m.nrows() {
        col_labels.push("F".to_owned());
    }
    render(m, &row_labels, &col_labels)
}

/// Renders a solution vector as `label = value` lines
pub fn format_vector(d: &DVector<f64>, mapping: &[usize]) -> String {
    let mut out = String::new();
    for (value, &dof) in d.iter().zip(mapping) {
        out.push_str(&format!("{} = {value:.6}\n", dof_label(dof)));
    }
    out
}

/// Writes the node table of a graph as CSV
pub fn write_nodes_csv(graph: &Graph, out: &mut impl Write) -> Result<(), FeldsparError> {
    writeln!(out, "index,x,y,constrained_x,constrained_y,fx,fy")?;
    for key in graph.keys() {
        let node = graph.node(key).ok_or(FeldsparError::StaleNode)?;
        let force = graph.forces();
        writeln!(
            out,
            "{index},{x},{y},{cx},{cy},{fx},{fy}",
            index = node.index,
            x = node.position.x,
            y = node.position.y,
            cx = node.constraint.x,
            cy = node.constraint.y,
            fx = force[DOF * node.index],
            fy = force[DOF * node.index + 1],
        )?;
    }
    Ok(())
}

/// Writes the element table of a graph as CSV, nodes given by dense index
///
/// Areas come from the current node positions, so elements that were never
/// ticked still report their real size.
pub fn write_elements_csv(graph: &Graph, out: &mut impl Write) -> Result<(), FeldsparError> {
    writeln!(out, "n0,n1,n2,area")?;
    for element in graph.elements() {
        let [n0, n1, n2] = element.node_indices(graph.nodes())?;
        let [p1, p2, p3] = element.positions(graph.nodes())?;
        let area = cross_z(&p1, &p2, &p3).abs() / 2.0;
        writeln!(out, "{n0},{n1},{n2},{area}")?;
    }
    Ok(())
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `graph` - The graph after the last tick
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    graph: &Graph,
    nodes_output: &Path,
    elements_output: &Path,
) -> Result<(), FeldsparError> {
    let mut nodes_file = std::fs::File::create(nodes_output).map_err(|err| {
        FeldsparError::PostProcessor(format!(
            "Failed to create {}: {err}",
            nodes_output.display()
        ))
    })?;
    let mut elements_file = std::fs::File::create(elements_output).map_err(|err| {
        FeldsparError::PostProcessor(format!(
            "Failed to create {}: {err}",
            elements_output.display()
        ))
    })?;

    write_nodes_csv(graph, &mut nodes_file)?;
    write_elements_csv(graph, &mut elements_file)?;

    tracing::info!(
        "wrote output to {} and {}",
        nodes_output.display(),
        elements_output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Constraint;
    use nalgebra::{dmatrix, dvector, Vector2};

    #[test]
    fn dof_labels_name_node_and_axis() {
        assert_eq!(dof_label(0), "d0x");
        assert_eq!(dof_label(5), "d2y");
    }

    #[test]
    fn augmented_dump_has_force_column() {
        let dump = format_matrix(&dmatrix![1.0, 0.0, 2.0; 0.0, 1.0, 3.0]);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("d0x") && lines[0].contains("d0y") && lines[0].ends_with('F'));
        assert!(lines[1].starts_with("d0x"));
        assert!(lines[2].contains("3.0000"));
    }

    #[test]
    fn constrained_dump_uses_global_dof_labels() {
        let dump = format_constrained(&dmatrix![4.0, 1.0], &[5]);
        assert!(dump.lines().nth(1).unwrap().starts_with("d2y"));

        let solution = format_vector(&dvector![0.5, -1.0], &[2, 5]);
        assert_eq!(solution, "d1x = 0.500000\nd2y = -1.000000\n");
    }

    #[test]
    fn csv_tables_follow_dense_order() {
        let mut graph = Graph::new();
        let a = graph.add_node(Vector2::new(0.0, 0.0));
        let b = graph.add_node(Vector2::new(2.0, 0.0));
        let c = graph.add_node(Vector2::new(0.0, 2.0));
        graph.set_constraint(a, Constraint::FIXED).unwrap();
        graph.set_nodal_force(c, Vector2::new(1.5, -2.0)).unwrap();
        graph.add_element(a, b, c).unwrap();

        let mut nodes = Vec::new();
        write_nodes_csv(&graph, &mut nodes).unwrap();
        let nodes = String::from_utf8(nodes).unwrap();
        assert_eq!(
            nodes,
            "index,x,y,constrained_x,constrained_y,fx,fy\n\
             0,0,0,true,true,0,0\n\
             1,2,0,false,false,0,0\n\
             2,0,2,false,false,1.5,-2\n"
        );

        let mut elements = Vec::new();
        write_elements_csv(&graph, &mut elements).unwrap();
        let elements = String::from_utf8(elements).unwrap();
        assert_eq!(elements, "n0,n1,n2,area\n0,1,2,2\n");
    }

    #[test]
    fn element_area_follows_moved_nodes() {
        let mut graph = Graph::new();
        let a = graph.add_node(Vector2::new(0.0, 0.0));
        let b = graph.add_node(Vector2::new(1.0, 0.0));
        let c = graph.add_node(Vector2::new(0.0, 1.0));
        graph.add_element(a, b, c).unwrap();
        graph.set_position(c, Vector2::new(0.0, 6.0)).unwrap();

        let mut elements = Vec::new();
        write_elements_csv(&graph, &mut elements).unwrap();
        let elements = String::from_utf8(elements).unwrap();
        assert_eq!(elements.lines().nth(1), Some("0,1,2,3"));
    }
}
