//! Workflow command templates.
//!
//! Each workflow name maps to a pure function from the in-container
//! runconfig path to the shell command that runs the workflow.

use std::collections::BTreeMap;
use std::fmt;

use wigwam_common::constants::WORKFLOW_MODULE_ROOT;
use wigwam_common::error::{Result, WigwamError};

/// A command template: runconfig path in, shell command out.
pub type CommandTemplate = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Registry of workflow command templates.
pub struct WorkflowCommands {
    templates: BTreeMap<String, CommandTemplate>,
}

fn module_command(module: &str, runconfig: &str) -> String {
    format!("python -m {WORKFLOW_MODULE_ROOT}.{module} {runconfig}")
}

impl WorkflowCommands {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    /// Creates a registry with the standard workflows.
    #[must_use]
    pub fn standard() -> Self {
        let mut commands = Self::new();
        for (name, module) in [("gslc", "gslc"), ("gcov", "gcov"), ("rslc", "focus")] {
            commands.register(name, move |rc| module_command(module, rc));
        }
        commands.register("insar", |rc| format!("{} --restart", module_command("insar", rc)));
        for name in ["el_edge", "el_null"] {
            commands.register(name, move |rc| module_command(name, &format!("@{rc}")));
        }
        commands.register("soil_moisture", |rc| {
            format!("micromamba run -n SoilMoisture NISAR_SM_SAS {rc}")
        });
        commands
    }

    /// Adds or replaces a workflow template.
    pub fn register<F>(&mut self, name: impl Into<String>, template: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let _ = self.templates.insert(name.into(), Box::new(template));
    }

    /// Returns whether `name` has a template.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Returns the registered workflow names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Renders the command of workflow `name` for `runconfig`.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::UnknownWorkflow` if `name` has no template.
    pub fn command_for(&self, name: &str, runconfig: &str) -> Result<String> {
        self.templates
            .get(name)
            .map(|template| template(runconfig))
            .ok_or_else(|| WigwamError::UnknownWorkflow {
                name: name.to_string(),
            })
    }
}

impl Default for WorkflowCommands {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for WorkflowCommands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.templates.keys()).finish()
    }
}
