use crate::concurrency::{shutdown_requested, SubvolumeLock};
use crate::graph::{dependency_order, NodeFacts};
use crate::items::{ImageItem, Item};
use crate::lifecycle::{validate_transition, BuildState, FailureKind};
use crate::parent::gen_parent_layer_items;
use crate::phases::split_phases;
use crate::CoreError;
use layerc_runtime::{PrivilegedExecutor, RootOp, RuntimeError, Subvolume};
use layerc_schema::{LayerDeclaration, PackageSource, Provides, Requires, TargetLabel};
use layerc_store::{SubvolumeDescriptor, SubvolumeLayout};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// All items of one layer, before validation.
///
/// Tracks the validation side of the build lifecycle: `Planned` until
/// [`LayerBuild::validate`] runs, then `Validated` or `Failed` with the kind
/// of validation error.
#[derive(Debug, Clone)]
pub struct LayerBuild {
    target: TargetLabel,
    items: Vec<Item>,
    state: BuildState,
}

impl LayerBuild {
    pub fn new(target: TargetLabel, items: Vec<Item>) -> Self {
        Self {
            target,
            items,
            state: BuildState::Planned,
        }
    }

    pub fn target(&self) -> &TargetLabel {
        &self.target
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Check every provides/requires fact and fix the build order.
    ///
    /// Reads nothing from and writes nothing to any subvolume. A validation
    /// error leaves the build in `Failed` with the matching kind.
    pub fn validate(&mut self) -> Result<BuildPlan, CoreError> {
        let steps = match self.ordered_steps() {
            Ok(steps) => steps,
            Err(err) => {
                if let Some(kind) = FailureKind::of(&err).filter(|k| k.is_validation()) {
                    if validate_transition(self.state, BuildState::Failed(kind)).is_ok() {
                        self.state = BuildState::Failed(kind);
                    }
                }
                return Err(err);
            }
        };
        if self.state != BuildState::Validated {
            validate_transition(self.state, BuildState::Validated)?;
            self.state = BuildState::Validated;
        }
        debug!("validated {}: {} steps", self.target, steps.len());
        Ok(BuildPlan {
            target: self.target.clone(),
            steps,
            state: BuildState::Validated,
        })
    }

    fn ordered_steps(&self) -> Result<Vec<Item>, CoreError> {
        let phases = split_phases(&self.items)?;

        let mut graph_items: Vec<Item> = Vec::with_capacity(phases.ordered.len() + 1);
        graph_items.extend(phases.parent.iter().cloned());
        graph_items.extend(phases.ordered.iter().cloned());
        let facts: Vec<NodeFacts> = graph_items.iter().map(|i| NodeFacts::of(i)).collect();
        let order = dependency_order(&facts)?;

        let mut steps = Vec::with_capacity(graph_items.len() + 2);
        let mut ordered = order.into_iter();
        if phases.parent.is_some() {
            // The parent requires nothing and has the lowest index.
            if let Some(ix) = ordered.next() {
                steps.push(graph_items[ix].clone());
            }
        }
        steps.extend(phases.remove.map(Item::Packages));
        steps.extend(phases.install.map(Item::Packages));
        steps.extend(ordered.map(|ix| graph_items[ix].clone()));
        Ok(steps)
    }

    /// Validate, then run every step against `subvol`.
    pub fn execute(&mut self, subvol: &mut Subvolume) -> Result<(), CoreError> {
        self.validate()?.execute(subvol)
    }
}

/// One step of a validated plan, as reported to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub ordinal: usize,
    pub kind: &'static str,
    pub from_target: String,
    pub description: String,
    pub provides: Vec<Provides>,
    pub requires: Vec<Requires>,
}

/// Items in the order they will be built.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    target: TargetLabel,
    steps: Vec<Item>,
    state: BuildState,
}

impl BuildPlan {
    pub fn target(&self) -> &TargetLabel {
        &self.target
    }

    pub fn steps(&self) -> &[Item] {
        &self.steps
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn describe(&self) -> Vec<PlanStep> {
        self.steps
            .iter()
            .enumerate()
            .map(|(ix, item)| PlanStep {
                ordinal: ix + 1,
                kind: item.kind_name(),
                from_target: item.from_target().to_string(),
                description: item.to_string(),
                provides: item.provides(),
                requires: item.requires(),
            })
            .collect()
    }

    /// Run the plan, stopping between items once a shutdown was requested.
    pub fn execute(&mut self, subvol: &mut Subvolume) -> Result<(), CoreError> {
        self.execute_with(subvol, &shutdown_requested)
    }

    /// Run the plan, consulting `should_stop` before each item. Items that
    /// already ran are not undone on failure.
    pub fn execute_with(
        &mut self,
        subvol: &mut Subvolume,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<(), CoreError> {
        self.transition(BuildState::Executing)?;
        for (ix, item) in self.steps.iter().enumerate() {
            let ordinal = ix + 1;
            let result = if should_stop() {
                Err(CoreError::Interrupted(format!("step {ordinal} ({item})")))
            } else {
                debug!("[{ordinal}] {item} (from {})", item.from_target());
                item.build(subvol).map_err(|source| {
                    warn!("step {ordinal} failed: {item}: {source}");
                    CoreError::Mutation {
                        target: item.from_target().to_string(),
                        source,
                    }
                })
            };
            if let Err(err) = result {
                if let Some(kind) = FailureKind::of(&err) {
                    validate_transition(self.state, BuildState::Failed(kind))?;
                    self.state = BuildState::Failed(kind);
                }
                return Err(err);
            }
        }
        self.transition(BuildState::Done)
    }

    fn transition(&mut self, to: BuildState) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Skip marking the finished subvolume read-only.
    pub leave_writable: bool,
    /// Where to write the new descriptor. Defaults to the layout's
    /// descriptor path for the subvolume.
    pub descriptor_out: Option<PathBuf>,
}

/// Result of a successful layer build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub target: String,
    pub subvolume_path: PathBuf,
    pub descriptor_path: PathBuf,
    pub descriptor: SubvolumeDescriptor,
    pub steps: usize,
}

/// Builds layers into a subvolumes directory.
#[derive(Debug)]
pub struct LayerCompiler {
    layout: SubvolumeLayout,
    executor: Arc<dyn PrivilegedExecutor>,
}

impl LayerCompiler {
    pub fn new(subvolumes_dir: impl Into<PathBuf>, executor: Arc<dyn PrivilegedExecutor>) -> Self {
        Self {
            layout: SubvolumeLayout::new(subvolumes_dir),
            executor,
        }
    }

    pub fn layout(&self) -> &SubvolumeLayout {
        &self.layout
    }

    pub fn executor(&self) -> &Arc<dyn PrivilegedExecutor> {
        &self.executor
    }

    /// Construct every item of `decl`, the parent item first.
    ///
    /// `parent_override` and `source_override` take precedence over the
    /// declaration's `parent_layer` and `package_source`.
    pub fn load(
        &self,
        decl: &LayerDeclaration,
        parent_override: Option<&Path>,
        source_override: Option<&PackageSource>,
    ) -> Result<LayerBuild, CoreError> {
        let target = &decl.layer.target;
        let descriptor = parent_override.or(decl.layer.parent_layer.as_deref());
        let parent = gen_parent_layer_items(target, descriptor, &self.layout, &*self.executor)?;

        let declared_source = decl.layer.package_source.clone().map(PackageSource::new);
        let source = source_override.or(declared_source.as_ref());

        let mut items = Vec::with_capacity(decl.items.len() + 1);
        items.push(parent);
        for item in &decl.items {
            items.push(Item::from_declaration(item, target, source)?);
        }
        debug!("loaded {} items for {target}", items.len());
        Ok(LayerBuild::new(target.clone(), items))
    }

    /// Load and validate without touching any subvolume.
    pub fn plan(
        &self,
        decl: &LayerDeclaration,
        parent_override: Option<&Path>,
        source_override: Option<&PackageSource>,
    ) -> Result<BuildPlan, CoreError> {
        let mut build = self.load(decl, parent_override, source_override)?;
        build.validate()
    }

    /// Validate `build` and build it into `<subvolumes_dir>/<rel_path>`.
    pub fn build(
        &self,
        build: &mut LayerBuild,
        rel_path: &str,
        options: &BuildOptions,
    ) -> Result<BuildResult, CoreError> {
        let mut plan = build.validate()?;

        self.layout.initialize()?;
        let lock_path = self.layout.lock_file(rel_path)?;
        let _lock = SubvolumeLock::try_acquire(&lock_path)?
            .ok_or_else(|| CoreError::Locked(lock_path.clone()))?;

        let dest = self.layout.subvolume_path(rel_path)?;
        let mut subvol = Subvolume::new(&dest, Arc::clone(&self.executor));
        if subvol.exists() {
            return Err(RuntimeError::AlreadyExists(dest).into());
        }
        if let Some(parent) = dest.parent() {
            if !self.executor.exists(parent) {
                self.executor.run(&RootOp::MakeDirs {
                    path: parent.to_path_buf(),
                })?;
            }
        }

        info!(
            "building {} into {} ({} steps)",
            build.target(),
            dest.display(),
            plan.steps().len()
        );
        plan.execute(&mut subvol)?;

        if options.leave_writable {
            debug!("leaving {} writable", dest.display());
        } else {
            subvol.set_readonly(true)?;
        }

        let descriptor = SubvolumeDescriptor::for_subvolume(
            SubvolumeLayout::validate_rel_path(rel_path)?.relative(),
        )?;
        let descriptor_path = match &options.descriptor_out {
            Some(path) => path.clone(),
            None => self.layout.descriptor_path(rel_path)?,
        };
        descriptor.write_to(&descriptor_path)?;

        info!("built {} at {}", build.target(), dest.display());
        Ok(BuildResult {
            target: build.target().to_string(),
            subvolume_path: dest,
            descriptor_path,
            descriptor,
            steps: plan.steps().len(),
        })
    }
}
