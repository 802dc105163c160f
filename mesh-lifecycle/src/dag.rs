use std::collections::{HashMap, HashSet};

use mesh_primitives::MeshError;

/// Topologically orders `services` (name -> declared dependency names),
/// aborting with a `Dependency` error on a cycle (spec.md §4.5
/// "Startup"). Returned order is safe for initialization; reversing it is
/// safe for shutdown.
pub fn topological_order(services: &HashMap<String, Vec<String>>) -> Result<Vec<String>, MeshError> {
    let mut order = Vec::with_capacity(services.len());
    let mut visited: HashSet<String> = HashSet::new();
    let mut in_progress: HashSet<String> = HashSet::new();

    for name in services.keys() {
        visit(name, services, &mut visited, &mut in_progress, &mut order)?;
    }
    Ok(order)
}

fn visit(
    name: &str,
    services: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    in_progress: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> Result<(), MeshError> {
    if visited.contains(name) {
        return Ok(());
    }
    if in_progress.contains(name) {
        return Err(MeshError::Dependency(format!("dependency cycle detected at {name}")));
    }
    let Some(deps) = services.get(name) else {
        return Err(MeshError::Dependency(format!("unknown dependency: {name}")));
    };

    in_progress.insert(name.to_string());
    for dep in deps {
        visit(dep, services, visited, in_progress, order)?;
    }
    in_progress.remove(name);

    visited.insert(name.to_string());
    order.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_dependencies_before_dependents() {
        let mut services = HashMap::new();
        services.insert("a".to_string(), vec![]);
        services.insert("b".to_string(), vec!["a".to_string()]);
        services.insert("c".to_string(), vec!["a".to_string(), "b".to_string()]);
        let order = topological_order(&services).unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn detects_cycles() {
        let mut services = HashMap::new();
        services.insert("a".to_string(), vec!["b".to_string()]);
        services.insert("b".to_string(), vec!["a".to_string()]);
        assert!(matches!(topological_order(&services), Err(MeshError::Dependency(_))));
    }

    #[test]
    fn missing_dependency_is_an_error() {
        let mut services = HashMap::new();
        services.insert("a".to_string(), vec!["ghost".to_string()]);
        assert!(matches!(topological_order(&services), Err(MeshError::Dependency(_))));
    }
}
