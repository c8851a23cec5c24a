//! The declarative module table.
//!
//! Each [`Module`] lists the artifacts it produces and the modules it depends
//! on. The built-in table describes the Jamoma suite; a configuration file may
//! replace it wholesale with `[[modules]]` entries.

use crate::descriptor::ArtifactDescriptor;
use crate::error::{InstallerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A semantic module name, such as `Foundation` or `Score`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    /// Create a new module name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the module name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ModuleName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One buildable unit of the suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Module name; also the name of its sibling project directory.
    pub name: ModuleName,
    /// Declared priority used to break ordering ties (lower goes first).
    pub priority: u32,
    /// Modules whose artifacts must be staged before this one.
    pub depends_on: Vec<ModuleName>,
    /// Artifacts this module produces.
    pub artifacts: Vec<ArtifactDescriptor>,
}

impl Module {
    /// Create a module with no dependencies or artifacts.
    #[must_use]
    pub fn new(name: impl Into<ModuleName>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            depends_on: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// Add a dependency.
    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<ModuleName>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    /// Add an artifact descriptor.
    #[must_use]
    pub fn artifact(mut self, descriptor: ArtifactDescriptor) -> Self {
        self.artifacts.push(descriptor);
        self
    }
}

/// A validated set of modules.
///
/// Names are unique, every dependency refers to a declared module, and every
/// descriptor is internally consistent. Acyclicity is checked when ordering,
/// see [`crate::graph::order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    modules: Vec<Module>,
}

impl Catalog {
    /// Validate and wrap a module list.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::DuplicateModule`],
    /// [`InstallerError::UnknownDependency`], or
    /// [`InstallerError::InvalidConfig`] for an inconsistent descriptor.
    pub fn new(modules: Vec<Module>) -> Result<Self> {
        let mut names = BTreeSet::new();
        for module in &modules {
            if !names.insert(module.name.clone()) {
                return Err(InstallerError::DuplicateModule {
                    name: module.name.clone(),
                });
            }
        }

        for module in &modules {
            if let Some(dependency) = module.depends_on.iter().find(|d| !names.contains(*d)) {
                return Err(InstallerError::UnknownDependency {
                    module: module.name.clone(),
                    dependency: dependency.clone(),
                });
            }
            for descriptor in &module.artifacts {
                descriptor
                    .validate()
                    .map_err(|reason| InstallerError::InvalidConfig {
                        path: "module table".into(),
                        reason: format!("{}: {reason}", module.name),
                    })?;
            }
        }

        Ok(Self { modules })
    }

    /// The built-in Jamoma suite table.
    #[must_use]
    pub fn jamoma() -> Self {
        Self {
            modules: jamoma_modules(),
        }
    }

    /// All modules in declaration order.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Look up a module by name.
    #[must_use]
    pub fn get(&self, name: &ModuleName) -> Option<&Module> {
        self.modules.iter().find(|module| &module.name == name)
    }

    /// Look up a module by name, failing when it is not declared.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::UnknownModule`] if no module has that name.
    pub fn require(&self, name: &ModuleName) -> Result<&Module> {
        self.get(name)
            .ok_or_else(|| InstallerError::UnknownModule { name: name.clone() })
    }
}

/// Name of the runtime layer every other module builds on.
pub const FOUNDATION: &str = "Foundation";
/// Name of the signal-processing layer.
pub const DSP: &str = "DSP";
/// Name of the communication layer.
pub const MODULAR: &str = "Modular";
/// Name of the sequencing layer.
pub const SCORE: &str = "Score";

fn jamoma_modules() -> Vec<Module> {
    vec![
        Module::new(FOUNDATION, 0)
            .artifact(ArtifactDescriptor::header("library/includes/*"))
            .artifact(ArtifactDescriptor::library("library/build/JamomaFoundation{lib}").aliased())
            .artifact(plugin("DataspaceLib"))
            .artifact(plugin("NetworkLib")),
        Module::new(DSP, 1)
            .depends_on(FOUNDATION)
            .artifact(ArtifactDescriptor::header("library/includes/*"))
            .artifact(ArtifactDescriptor::library("library/build/JamomaDSP{lib}").aliased())
            .artifact(plugin("FunctionLib"))
            .artifact(plugin("AnalysisLib")),
        Module::new(MODULAR, 2)
            .depends_on(FOUNDATION)
            .depends_on(DSP)
            .artifact(ArtifactDescriptor::header("library/includes/TTModular.h"))
            .artifact(ArtifactDescriptor::header(
                "library/includes/TTModularSymbolCache.h",
            ))
            .artifact(ArtifactDescriptor::header("library/PeerObject/*.h"))
            .artifact(ArtifactDescriptor::header("library/ProtocolLib/Protocol.h"))
            .artifact(ArtifactDescriptor::header("library/SchedulerLib/Scheduler.h"))
            .artifact(ArtifactDescriptor::library("library/build/JamomaModular{lib}").aliased())
            .artifact(plugin("Minuit"))
            .artifact(plugin("OSC"))
            .artifact(plugin("System"))
            .artifact(plugin("MIDI").optional()),
        Module::new(SCORE, 3)
            .depends_on(FOUNDATION)
            .depends_on(DSP)
            .depends_on(MODULAR)
            .artifact(ArtifactDescriptor::header("library/includes/*.h"))
            .artifact(ArtifactDescriptor::header("library/tests/*.h"))
            .artifact(ArtifactDescriptor::header("extensions/TimePluginLib.h"))
            .artifact(ArtifactDescriptor::library("library/build/JamomaScore{lib}").aliased())
            .artifact(plugin("Interval"))
            .artifact(plugin("Automation"))
            .artifact(plugin("Scenario"))
            .artifact(plugin("Loop").optional()),
    ]
}

/// Plugin bundles live at `extensions/<Name>/build/<Name>{plugin}` and are
/// always aliased.
fn plugin(name: &str) -> ArtifactDescriptor {
    ArtifactDescriptor::plugin_bundle(format!("extensions/{name}/build/{name}{{plugin}}")).aliased()
}
