//! Dependency Graph Builder and layered topological sort (§4.8, §4.9).
//!
//! Nodes are keyed by string: a resource's canonical address, or
//! `scope+".outputs."+name` for a declared output (root outputs render as
//! `outputs.N`, matching `scope_string_for(&[])` being empty).

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::address::scope_string_for;
use crate::ast::{Attributes, Expression};
use crate::error::{MiniformError, Result};
use crate::loader::{LoadedOutput, LoadedResource};

pub fn output_node_key(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        format!("outputs.{}", name)
    } else {
        format!("{}.outputs.{}", scope, name)
    }
}

/// Build the execution graph: one node per resource, one node per output,
/// edges "depended-upon → dependent".
pub fn build_graph(resources: &[LoadedResource], outputs: &[LoadedOutput]) -> Result<(DiGraph<String, ()>, HashMap<String, NodeIndex>)> {
    let mut graph = DiGraph::new();
    let mut index_of: HashMap<String, NodeIndex> = HashMap::new();

    for r in resources {
        let key = r.address.to_string();
        let idx = graph.add_node(key.clone());
        index_of.insert(key, idx);
    }
    for o in outputs {
        let key = output_node_key(&o.scope, &o.name);
        let idx = graph.add_node(key.clone());
        index_of.insert(key, idx);
    }

    for r in resources {
        let dependent_key = r.address.to_string();
        let mut deps = Vec::new();
        collect_dependencies(&r.stmt.attrs, &r.address.module_path, &mut deps);
        add_edges(&mut graph, &index_of, &deps, &dependent_key)?;
    }
    for o in outputs {
        let dependent_key = output_node_key(&o.scope, &o.name);
        let module_path = module_path_from_scope(&o.scope);
        let mut deps = Vec::new();
        collect_expr_dependencies(&o.value, &module_path, &mut deps);
        add_edges(&mut graph, &index_of, &deps, &dependent_key)?;
    }

    Ok((graph, index_of))
}

fn module_path_from_scope(scope: &str) -> Vec<String> {
    if scope.is_empty() {
        return Vec::new();
    }
    scope
        .split('.')
        .collect::<Vec<_>>()
        .chunks(2)
        .filter(|c| c.len() == 2 && c[0] == "module")
        .map(|c| c[1].to_string())
        .collect()
}

fn add_edges(graph: &mut DiGraph<String, ()>, index_of: &HashMap<String, NodeIndex>, deps: &[String], dependent_key: &str) -> Result<()> {
    let dependent_idx = *index_of.get(dependent_key).ok_or_else(|| {
        MiniformError::plan(format!("internal error: missing graph node for '{}'", dependent_key))
    })?;
    for dep_key in deps {
        if let Some(&dep_idx) = index_of.get(dep_key) {
            graph.add_edge(dep_idx, dependent_idx, ());
        }
        // A dependency on a node the graph has never heard of (e.g. an
        // address typo) is left for the resolver to surface at apply time.
    }
    Ok(())
}

fn collect_dependencies(attrs: &Attributes, module_path: &[String], out: &mut Vec<String>) {
    for expr in attrs.values() {
        collect_expr_dependencies(expr, module_path, out);
    }
}

fn collect_expr_dependencies(expr: &Expression, module_path: &[String], out: &mut Vec<String>) {
    match expr {
        Expression::Reference(parts) => collect_reference_dependency(parts, module_path, out),
        Expression::List(items) => {
            for item in items {
                collect_expr_dependencies(item, module_path, out);
            }
        }
        Expression::Map(entries) => {
            for v in entries.values() {
                collect_expr_dependencies(v, module_path, out);
            }
        }
        Expression::String(s) => collect_interpolation_dependencies(s, module_path, out),
        Expression::Number(_) | Expression::Boolean(_) => {}
    }
}

fn collect_interpolation_dependencies(s: &str, module_path: &[String], out: &mut Vec<String>) {
    let mut rest = s;
    while let Some(open) = rest.find("${") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find('}') else { break };
        let inner = after_open[..close].trim();
        let parts: Vec<String> = inner.split('.').map(|p| p.to_string()).collect();
        collect_reference_dependency(&parts, module_path, out);
        rest = &after_open[close + 1..];
    }
}

/// Per §4.8: `var.*`/`data.*` add no graph edge (already materialised before
/// planning); `module.M.O` edges from the child module's output node;
/// anything else edges from the same-scope resource address.
fn collect_reference_dependency(parts: &[String], module_path: &[String], out: &mut Vec<String>) {
    if parts.is_empty() {
        return;
    }
    match parts[0].as_str() {
        "var" | "data" => {}
        "module" if parts.len() == 3 => {
            let mut child_path = module_path.to_vec();
            child_path.push(parts[1].clone());
            let child_scope = scope_string_for(&child_path);
            out.push(output_node_key(&child_scope, &parts[2]));
        }
        "module" => {
            // Absolute module-qualified resource reference: address is
            // everything but the trailing attribute.
            if parts.len() >= 5 {
                out.push(parts[..parts.len() - 1].join("."));
            }
        }
        _ if parts.len() == 3 => {
            out.push(crate::address::Address::new(module_path.to_vec(), parts[0].clone(), parts[1].clone()).to_string());
        }
        _ => {}
    }
}

/// Kahn's algorithm producing layers of mutually independent nodes. Fails
/// with `CycleError` if not every node is emitted.
pub fn layered_topo_sort(graph: &DiGraph<String, ()>) -> Result<Vec<Vec<String>>> {
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    let mut adjacency: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();

    for idx in graph.node_indices() {
        in_degree.insert(idx, 0);
        adjacency.insert(idx, Vec::new());
    }
    for edge in graph.edge_indices() {
        let (from, to) = graph.edge_endpoints(edge).unwrap();
        adjacency.entry(from).or_default().push(to);
        *in_degree.entry(to).or_insert(0) += 1;
    }

    let mut layers: Vec<Vec<String>> = Vec::new();
    let mut frontier: Vec<NodeIndex> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&idx, _)| idx)
        .collect();
    let mut visited = 0usize;

    while !frontier.is_empty() {
        let mut layer: Vec<String> = Vec::new();
        let mut next_frontier = Vec::new();

        for &node in &frontier {
            layer.push(graph[node].clone());
            visited += 1;
            if let Some(neighbors) = adjacency.get(&node) {
                for &neighbor in neighbors {
                    let deg = in_degree.get_mut(&neighbor).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        next_frontier.push(neighbor);
                    }
                }
            }
        }

        layer.sort();
        layers.push(layer);
        frontier = next_frontier;
    }

    if visited != graph.node_count() {
        return Err(MiniformError::CycleError("Dependency Cycle Detected".to_string()));
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::ast::ResourceStmt;
    use std::collections::HashMap as Map;

    fn resource(module_path: Vec<String>, resource_type: &str, name: &str, attrs: Map<String, Expression>) -> LoadedResource {
        LoadedResource {
            address: Address::new(module_path, resource_type, name),
            stmt: ResourceStmt {
                resource_type: resource_type.to_string(),
                name: name.to_string(),
                attrs,
            },
        }
    }

    #[test]
    fn independent_resources_share_one_layer() {
        let a = resource(vec![], "r", "a", Map::new());
        let b = resource(vec![], "r", "b", Map::new());
        let (graph, _) = build_graph(&[a, b], &[]).unwrap();
        let layers = layered_topo_sort(&graph).unwrap();
        assert_eq!(layers, vec![vec!["r.a".to_string(), "r.b".to_string()]]);
    }

    #[test]
    fn a_reference_produces_two_layers_in_dependency_order() {
        let a = resource(vec![], "r", "a", Map::new());
        let mut b_attrs = Map::new();
        b_attrs.insert("ref".to_string(), Expression::String("${r.a.id}".to_string()));
        let b = resource(vec![], "r", "b", b_attrs);

        let (graph, _) = build_graph(&[a, b], &[]).unwrap();
        let layers = layered_topo_sort(&graph).unwrap();
        assert_eq!(layers, vec![vec!["r.a".to_string()], vec!["r.b".to_string()]]);
    }

    #[test]
    fn mutual_reference_is_a_cycle() {
        let mut x_attrs = Map::new();
        x_attrs.insert("ref".to_string(), Expression::Reference(vec!["r".into(), "y".into(), "id".into()]));
        let x = resource(vec![], "r", "x", x_attrs);

        let mut y_attrs = Map::new();
        y_attrs.insert("ref".to_string(), Expression::Reference(vec!["r".into(), "x".into(), "id".into()]));
        let y = resource(vec![], "r", "y", y_attrs);

        let (graph, _) = build_graph(&[x, y], &[]).unwrap();
        let err = layered_topo_sort(&graph).unwrap_err();
        assert!(matches!(err, MiniformError::CycleError(_)));
    }

    #[test]
    fn output_depends_on_its_feeding_resource() {
        let a = resource(vec![], "r", "a", Map::new());
        let output = LoadedOutput {
            scope: String::new(),
            name: "out".to_string(),
            value: Expression::Reference(vec!["r".into(), "a".into(), "id".into()]),
        };
        let (graph, _) = build_graph(&[a], &[output]).unwrap();
        let layers = layered_topo_sort(&graph).unwrap();
        assert_eq!(layers, vec![vec!["r.a".to_string()], vec!["outputs.out".to_string()]]);
    }

    #[test]
    fn resource_depends_on_a_module_output() {
        let mut attrs = Map::new();
        attrs.insert("ip".to_string(), Expression::Reference(vec!["module".into(), "app".into(), "ip".into()]));
        let consumer = resource(vec![], "r", "c", attrs);
        let output = LoadedOutput {
            scope: "module.app".to_string(),
            name: "ip".to_string(),
            value: Expression::String("10.0.0.1".to_string()),
        };
        let (graph, _) = build_graph(&[consumer], &[output]).unwrap();
        let layers = layered_topo_sort(&graph).unwrap();
        assert_eq!(layers, vec![vec!["module.app.outputs.ip".to_string()], vec!["r.c".to_string()]]);
    }

    #[test]
    fn self_reference_is_a_cycle_of_length_one() {
        let mut attrs = Map::new();
        attrs.insert("ref".to_string(), Expression::Reference(vec!["r".into(), "a".into(), "id".into()]));
        let a = resource(vec![], "r", "a", attrs);
        let (graph, _) = build_graph(&[a], &[]).unwrap();
        let err = layered_topo_sort(&graph).unwrap_err();
        assert!(matches!(err, MiniformError::CycleError(_)));
    }
}
