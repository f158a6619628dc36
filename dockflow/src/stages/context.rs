//! Inputs a stage receives from its pipeline, and the context resolved from
//! them during setup.

use super::ports::{FetchedSource, VolumeMount};
use super::spec::Stage;
use crate::utils::{merge_env, EnvMap, RunId};
use std::path::{Path, PathBuf};

/// Pipeline-level values a stage run resolves against.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Name of the owning pipeline.
    pub pipeline_name: String,
    /// Identifier of the current run.
    pub run_id: RunId,
    /// Position of the stage in the pipeline (zero based).
    pub index: usize,
    /// Number of stages in the pipeline.
    pub total: usize,
    /// Base directory used when the stage sets none.
    pub default_base_dir: PathBuf,
    /// Default build variables.
    pub default_build_env: EnvMap,
    /// Default run variables.
    pub default_run_env: EnvMap,
    /// Pipeline shared volume, with its per-run name. Stage volumes are
    /// scoped by `run_id` the same way.
    pub volume: Option<VolumeMount>,
    /// Directory under which this run's repositories are fetched.
    pub checkout_root: PathBuf,
}

impl StageContext {
    /// Creates a context with no defaults.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>, run_id: RunId, checkout_root: impl Into<PathBuf>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            run_id,
            index: 0,
            total: 1,
            default_base_dir: PathBuf::new(),
            default_build_env: EnvMap::new(),
            default_run_env: EnvMap::new(),
            volume: None,
            checkout_root: checkout_root.into(),
        }
    }

    /// Returns a copy positioned at `index` of `total`.
    #[must_use]
    pub fn at(&self, index: usize, total: usize) -> Self {
        Self {
            index,
            total,
            ..self.clone()
        }
    }

    /// Sets the default base directory.
    #[must_use]
    pub fn with_default_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_base_dir = dir.into();
        self
    }

    /// Sets the default build and run variables.
    #[must_use]
    pub fn with_default_env(mut self, build: EnvMap, run: EnvMap) -> Self {
        self.default_build_env = build;
        self.default_run_env = run;
        self
    }

    /// Sets the shared volume.
    #[must_use]
    pub fn with_volume(mut self, volume: Option<VolumeMount>) -> Self {
        self.volume = volume;
        self
    }

    /// Identifier used in logs: `pipeline/stage`.
    #[must_use]
    pub fn internal_id(&self, stage: &Stage) -> String {
        format!("{}/{}", self.pipeline_name, stage.name)
    }

    /// Directory a stage's repository is fetched into.
    #[must_use]
    pub fn checkout_dir(&self, container_id: &str) -> PathBuf {
        self.checkout_root.join(container_id)
    }
}

/// Everything setup resolved for a stage.
///
/// Produced once by setup and only read by build, run and teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    /// `pipeline/stage`.
    pub internal_id: String,
    /// Image tag.
    pub container_id: String,
    /// Base directory (the checkout for repository stages).
    pub base_dir: PathBuf,
    /// Directory the image is built and run from.
    pub work_dir: PathBuf,
    /// Shared volume, if any.
    pub volume: Option<VolumeMount>,
    /// Final build variables.
    pub build_env: EnvMap,
    /// Final run variables.
    pub run_env: EnvMap,
    /// Fetched repository, if the stage has one.
    pub source: Option<FetchedSource>,
}

impl ResolvedStage {
    /// Resolves a stage against its context and optional fetched source.
    #[must_use]
    pub fn resolve(stage: &Stage, ctx: &StageContext, source: Option<FetchedSource>) -> Self {
        let container_id = stage.effective_container_id();

        let volume = match (&stage.volume_name, &stage.volume_dir) {
            (Some(name), Some(dir)) => Some(VolumeMount::new(ctx.run_id.scoped(name), dir.clone())),
            _ => ctx.volume.clone(),
        };

        let mut build_env = stage.build_env.clone();
        let mut run_env = stage.run_env.clone();
        if let (Some(var), Some(fetched)) = (&stage.repo_version_env_var, &source) {
            build_env.insert(var.clone(), fetched.commit_id.clone());
            run_env.insert(var.clone(), fetched.commit_id.clone());
        }

        let base_dir = source.as_ref().map_or_else(
            || {
                stage
                    .base_dir
                    .clone()
                    .unwrap_or_else(|| ctx.default_base_dir.clone())
            },
            |fetched| fetched.dir.clone(),
        );
        let work_dir = join_stage_dir(&base_dir, &stage.dir);

        Self {
            internal_id: ctx.internal_id(stage),
            container_id,
            base_dir,
            work_dir,
            volume,
            build_env: merge_env(&ctx.default_build_env, &build_env),
            run_env: merge_env(&ctx.default_run_env, &run_env),
            source,
        }
    }

    /// Commit id of the fetched repository.
    #[must_use]
    pub fn commit_id(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.commit_id.as_str())
    }

    /// The stage definition with every resolved value filled in, for reports.
    #[must_use]
    pub fn record(&self, stage: &Stage) -> Stage {
        Stage {
            base_dir: Some(self.base_dir.clone()),
            build_env: self.build_env.clone(),
            run_env: self.run_env.clone(),
            container_id: Some(self.container_id.clone()),
            volume_name: self.volume.as_ref().map(|v| v.name.clone()),
            volume_dir: self.volume.as_ref().map(|v| v.dir.clone()),
            ..stage.clone()
        }
    }
}

fn join_stage_dir(base: &Path, dir: &str) -> PathBuf {
    if dir.is_empty() {
        base.to_path_buf()
    } else {
        base.join(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> StageContext {
        let mut build = EnvMap::new();
        build.insert("YEAR".to_string(), "2020".to_string());
        let mut run = EnvMap::new();
        run.insert("OUTPUT_FOLDER".to_string(), "/output".to_string());
        StageContext::new("TRT13", RunId::new(), "/tmp/dockflow-run")
            .with_default_base_dir("/home/pipelines")
            .with_default_env(build, run)
            .with_volume(Some(VolumeMount::new("shared-1234", "/output")))
    }

    #[test]
    fn test_resolve_local_stage() {
        let stage = Stage::new("Coleta Dados", "trt13").with_build_env("YEAR", "2021");
        let resolved = ResolvedStage::resolve(&stage, &ctx(), None);

        assert_eq!(resolved.internal_id, "TRT13/Coleta Dados");
        assert_eq!(resolved.container_id, "coleta-dados");
        assert_eq!(resolved.base_dir, PathBuf::from("/home/pipelines"));
        assert_eq!(resolved.work_dir, PathBuf::from("/home/pipelines/trt13"));
        assert_eq!(resolved.build_env.get("YEAR"), Some(&"2021".to_string()));
        assert_eq!(resolved.run_env.get("OUTPUT_FOLDER"), Some(&"/output".to_string()));
        assert_eq!(resolved.volume, Some(VolumeMount::new("shared-1234", "/output")));
    }

    #[test]
    fn test_stage_base_dir_and_volume_override() {
        let stage = Stage::new("a", "")
            .with_base_dir("/elsewhere")
            .with_volume("private", "/data");
        let ctx = ctx();
        let resolved = ResolvedStage::resolve(&stage, &ctx, None);

        assert_eq!(resolved.work_dir, PathBuf::from("/elsewhere"));
        assert_eq!(
            resolved.volume,
            Some(VolumeMount::new(ctx.run_id.scoped("private"), "/data"))
        );
        assert_ne!(resolved.volume.unwrap().name, "private");
    }

    #[test]
    fn test_fetched_source_injects_commit() {
        let stage = Stage::new("collect", "trt13")
            .with_repo("github.com/dadosjusbr/coletores")
            .with_repo_version_env_var("GIT_COMMIT");
        let source = FetchedSource {
            dir: PathBuf::from("/tmp/dockflow-run/collect"),
            commit_id: "abc123".to_string(),
        };
        let resolved = ResolvedStage::resolve(&stage, &ctx(), Some(source));

        assert_eq!(resolved.base_dir, PathBuf::from("/tmp/dockflow-run/collect"));
        assert_eq!(resolved.build_env.get("GIT_COMMIT"), Some(&"abc123".to_string()));
        assert_eq!(resolved.run_env.get("GIT_COMMIT"), Some(&"abc123".to_string()));
        assert_eq!(resolved.commit_id(), Some("abc123"));
    }

    #[test]
    fn test_record_fills_resolved_fields() {
        let stage = Stage::new("collect", "trt13");
        let resolved = ResolvedStage::resolve(&stage, &ctx(), None);
        let record = resolved.record(&stage);

        assert_eq!(record.name, "collect");
        assert_eq!(record.container_id.as_deref(), Some("collect"));
        assert_eq!(record.volume_name.as_deref(), Some("shared-1234"));
        assert_eq!(record.base_dir, Some(PathBuf::from("/home/pipelines")));
        assert_eq!(record.build_env.get("YEAR"), Some(&"2020".to_string()));
        assert_eq!(stage.container_id, None);
    }
}
