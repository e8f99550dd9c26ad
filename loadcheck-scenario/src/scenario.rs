//! Declarative scenarios and scenario sets

use crate::error::{ScenarioError, ScenarioResult};
use crate::model::{ScenarioDef, ScenarioFile, StepDef};
use crate::step::{check_variable_name, compile, ActionPlan, Step};
use crate::template::{Bindings, Template};
use async_trait::async_trait;
use loadcheck_core::{BenchResult, Credentials};
use loadcheck_pool::UserLease;
use loadcheck_runner::{Scenario, ScenarioContext, ScenarioTable};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A scenario compiled from a scenario file
pub struct DeclarativeScenario {
    name: String,
    weight: u32,
    vars: Vec<(String, Template)>,
    steps: Vec<Step>,
}

impl DeclarativeScenario {
    pub fn compile(def: ScenarioDef, base_dir: Option<&Path>) -> ScenarioResult<Self> {
        let scenario_error = |message: String| ScenarioError::Scenario {
            scenario: def.name.clone(),
            message,
        };

        if def.name.trim().is_empty() {
            return Err(ScenarioError::Scenario {
                scenario: def.name.clone(),
                message: "name is empty".to_string(),
            });
        }
        if def.steps.is_empty() {
            return Err(scenario_error("has no steps".to_string()));
        }

        // Variables see the user and random values, not each other
        let mut vars = Vec::with_capacity(def.vars.len());
        for (name, source) in &def.vars {
            check_variable_name(name).map_err(scenario_error)?;
            let template = compile(source, &HashSet::new()).map_err(scenario_error)?;
            vars.push((name.clone(), template));
        }

        let mut known: HashSet<String> = def.vars.keys().cloned().collect();
        let mut steps = Vec::with_capacity(def.steps.len());
        for (index, step) in def.steps.into_iter().enumerate() {
            let compiled = match step {
                StepDef::Register(step) => Step::register(step.register, &known),
                StepDef::ClearSession(step) if step.clear_session => Ok(Step::ClearSession),
                StepDef::ClearSession(_) => Err("clear_session: false is not a step".to_string()),
                StepDef::Action(action) => {
                    ActionPlan::compile(*action, base_dir, &mut known).map(|a| Step::Action(Box::new(a)))
                }
            };
            steps.push(compiled.map_err(|message| ScenarioError::Step {
                scenario: def.name.clone(),
                step: index + 1,
                message,
            })?);
        }

        Ok(Self {
            name: def.name,
            weight: def.weight,
            vars,
            steps,
        })
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    fn initial_vars(
        &self,
        ctx: &ScenarioContext,
        credentials: &Credentials,
    ) -> BenchResult<HashMap<String, String>> {
        let empty = HashMap::new();
        let bindings = Bindings {
            credentials,
            vars: &empty,
            rng: ctx.rng(),
        };
        self.vars
            .iter()
            .map(|(name, template)| Ok((name.clone(), template.render(&bindings)?)))
            .collect()
    }
}

#[async_trait]
impl Scenario for DeclarativeScenario {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &ScenarioContext, lease: &mut UserLease) -> BenchResult<()> {
        let credentials = lease.credentials().clone();
        let mut vars = self.initial_vars(ctx, &credentials)?;

        for step in &self.steps {
            match step {
                Step::ClearSession => {
                    debug!(scenario = %self.name, user = %credentials.name, "Clearing session");
                    ctx.player(lease).clear_session();
                }
                Step::Register { name, secret } => {
                    let account = {
                        let bindings = Bindings {
                            credentials: &credentials,
                            vars: &vars,
                            rng: ctx.rng(),
                        };
                        Credentials::new(name.render(&bindings)?, secret.render(&bindings)?)
                    };
                    debug!(scenario = %self.name, account = %account.name, "Registering user");
                    ctx.pool().register(account)?;
                }
                Step::Action(action) => {
                    debug!(scenario = %self.name, action = action.label(), "Playing action");
                    action.play(ctx, lease, &mut vars).await?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DeclarativeScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarativeScenario")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// Load mix and pre-test checks read from one scenario file
#[derive(Debug, Default, Clone)]
pub struct ScenarioSet {
    scenarios: Vec<Arc<DeclarativeScenario>>,
    checks: Vec<Arc<DeclarativeScenario>>,
}

impl ScenarioSet {
    /// Load a scenario file; file sources resolve against its directory
    pub fn from_file(path: impl AsRef<Path>) -> ScenarioResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ScenarioFile = serde_yaml::from_str(&content)?;
        let set = Self::compile(file, path.parent())?;
        info!(
            path = %path.display(),
            scenarios = set.scenarios.len(),
            checks = set.checks.len(),
            "Loaded scenario file"
        );
        Ok(set)
    }

    pub fn from_yaml(yaml: &str) -> ScenarioResult<Self> {
        let file: ScenarioFile = serde_yaml::from_str(yaml)?;
        Self::compile(file, None)
    }

    pub fn compile(file: ScenarioFile, base_dir: Option<&Path>) -> ScenarioResult<Self> {
        let mut names = HashSet::new();
        for def in file.scenarios.iter().chain(&file.checks) {
            if !names.insert(def.name.as_str()) {
                return Err(ScenarioError::DuplicateName(def.name.clone()));
            }
        }

        let compile_all = |defs: Vec<ScenarioDef>| {
            defs.into_iter()
                .map(|def| DeclarativeScenario::compile(def, base_dir).map(Arc::new))
                .collect::<ScenarioResult<Vec<_>>>()
        };

        Ok(Self {
            scenarios: compile_all(file.scenarios)?,
            checks: compile_all(file.checks)?,
        })
    }

    /// Weighted table for the load phase
    pub fn table(&self) -> ScenarioTable {
        let mut table = ScenarioTable::new();
        for scenario in &self.scenarios {
            table.push(Arc::clone(scenario) as Arc<dyn Scenario>, scenario.weight());
        }
        table
    }

    /// Pre-test checks in file order
    pub fn checks(&self) -> Vec<Arc<dyn Scenario>> {
        self.checks
            .iter()
            .map(|check| Arc::clone(check) as Arc<dyn Scenario>)
            .collect()
    }

    pub fn scenario_names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty() && self.checks.is_empty()
    }
}
