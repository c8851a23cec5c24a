//! Dependency ordering over the module table.
//!
//! Ordering uses Kahn's algorithm. Among modules whose dependencies are all
//! placed, the lowest declared priority goes first, then the name, so the
//! result is deterministic for any acyclic table.

use crate::catalog::{Catalog, Module, ModuleName};
use crate::error::{InstallerError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Order `modules` so that every module follows all of its dependencies.
///
/// Dependencies naming modules outside `modules` are ignored; use
/// [`Catalog::new`] to reject them up front.
///
/// # Errors
///
/// Returns [`InstallerError::CyclicDependency`] naming every module that
/// could not be placed.
pub fn order(modules: &[Module]) -> Result<Vec<&Module>> {
    let by_name: BTreeMap<&ModuleName, &Module> =
        modules.iter().map(|module| (&module.name, module)).collect();

    let mut in_degree: BTreeMap<&ModuleName, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&ModuleName, Vec<&ModuleName>> = BTreeMap::new();
    for module in modules {
        let known: BTreeSet<&ModuleName> = module
            .depends_on
            .iter()
            .filter(|dependency| by_name.contains_key(dependency))
            .collect();
        in_degree.insert(&module.name, known.len());
        for dependency in known {
            dependents.entry(dependency).or_default().push(&module.name);
        }
    }

    let mut ready: BTreeSet<(u32, &ModuleName)> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .filter_map(|(name, _)| by_name.get(name).map(|module| (module.priority, *name)))
        .collect();

    let mut ordered = Vec::with_capacity(modules.len());
    while let Some((_, name)) = ready.pop_first() {
        let Some(module) = by_name.get(name) else {
            continue;
        };
        ordered.push(*module);

        for dependent in dependents.get(name).into_iter().flatten() {
            let Some(degree) = in_degree.get_mut(dependent) else {
                continue;
            };
            *degree = degree.saturating_sub(1);
            if *degree == 0
                && let Some(next) = by_name.get(dependent)
            {
                ready.insert((next.priority, *dependent));
            }
        }
    }

    if ordered.len() == modules.len() {
        return Ok(ordered);
    }

    let placed: BTreeSet<&ModuleName> = ordered.iter().map(|module| &module.name).collect();
    let stuck = modules
        .iter()
        .map(|module| module.name.clone())
        .filter(|name| !placed.contains(name))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    Err(InstallerError::CyclicDependency { modules: stuck })
}

/// The module named `target` plus its transitive dependencies, in [`order`]
/// order.
///
/// # Errors
///
/// Returns [`InstallerError::UnknownModule`] if `target` or any dependency
/// reached from it is not declared, and [`InstallerError::CyclicDependency`]
/// if the reachable modules contain a cycle.
pub fn closure<'a>(catalog: &'a Catalog, target: &ModuleName) -> Result<Vec<&'a Module>> {
    let mut reached: BTreeSet<&ModuleName> = BTreeSet::new();
    let mut pending = vec![catalog.require(target)?];
    while let Some(module) = pending.pop() {
        if !reached.insert(&module.name) {
            continue;
        }
        for dependency in &module.depends_on {
            pending.push(catalog.require(dependency)?);
        }
    }

    let subset: Vec<Module> = catalog
        .modules()
        .iter()
        .filter(|module| reached.contains(&module.name))
        .cloned()
        .collect();
    let names: Vec<ModuleName> = order(&subset)?
        .into_iter()
        .map(|module| module.name.clone())
        .collect();

    names.iter().map(|name| catalog.require(name)).collect()
}
