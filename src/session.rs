//! The compile coordinator.
//!
//! A [`CompilerSession`] owns one cache, one worker pool and one set of
//! metrics. Only the session reads and writes the cache; workers compile
//! text into a [`CompiledModule`] and hand it back through a [`JobHandle`].
//! Several sessions can coexist without sharing anything.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use anyhow::{Context, Result};
use serde::{Serialize, Serializer};

use crate::ast::Program;
use crate::cache::{Cache, CacheEntry, FileMetadata, Lookup};
use crate::codegen::{self, GeneratedCode};
use crate::config::{CompilerConfig, Target};
use crate::error::{CompileError, ErrorReport, Warning, WarningKind};
use crate::parser;
use crate::pool::{JobError, JobHandle, WorkerPool};
use crate::reactive::{self, ReactiveGraph};

/// One compiled source file.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledModule {
    pub path: String,
    #[serde(skip)]
    pub program: Arc<Program>,
    #[serde(skip)]
    pub graph: Arc<ReactiveGraph>,
    /// Successful targets, in the order they were requested.
    pub outputs: Vec<GeneratedCode>,
    /// Targets whose backend rejected the component.
    #[serde(serialize_with = "serialize_errors")]
    pub target_errors: Vec<CompileError>,
    pub warnings: Vec<Warning>,
    pub from_cache: bool,
    /// Zero when served from the cache.
    pub parse_time: Duration,
    /// The last good compilation, returned because a reparse failed.
    pub stale: bool,
}

impl CompiledModule {
    pub fn output(&self, target: Target) -> Option<&GeneratedCode> {
        self.outputs.iter().find(|o| o.target == target)
    }

    /// The first requested target that succeeded.
    pub fn primary(&self) -> Option<&GeneratedCode> {
        self.outputs.first()
    }

    fn served_from_cache(&self) -> Self {
        Self {
            from_cache: true,
            parse_time: Duration::ZERO,
            stale: false,
            ..self.clone()
        }
    }
}

fn serialize_errors<S: Serializer>(errors: &[CompileError], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(CompileError::report))
}

/// Parse, analyze and generate every configured target for `source`.
pub fn compile_module(path: &str, source: &str, config: &CompilerConfig) -> Result<CompiledModule, CompileError> {
    let started = Instant::now();
    let program = parser::parse(source, path)?;
    let graph = reactive::analyze(&program)?;
    let targets = targets_for(&program, config)?;

    let mut outputs = Vec::new();
    let mut target_errors = Vec::new();
    for (target, result) in codegen::generate_all(&program, &graph, &targets) {
        match result {
            Ok(output) => outputs.push(output),
            Err(err) => {
                tracing::debug!(file = %path, %target, error = %err, "backend failed");
                target_errors.push(err);
            }
        }
    }

    let mut warnings = program.warnings.clone();
    warnings.extend(outputs.iter().flat_map(|o| o.warnings.iter().cloned()));

    Ok(CompiledModule {
        path: path.to_string(),
        warnings,
        program: Arc::new(program),
        graph: Arc::new(graph),
        outputs,
        target_errors,
        from_cache: false,
        parse_time: started.elapsed(),
        stale: false,
    })
}

/// Configured targets, else the frontmatter target, else the default.
fn targets_for(program: &Program, config: &CompilerConfig) -> Result<Vec<Target>, CompileError> {
    if !config.targets.is_empty() {
        return Ok(config.targets.clone());
    }
    program
        .target()
        .or(config.default_target)
        .map(|t| vec![t])
        .ok_or_else(|| {
            CompileError::frontmatter(&program.path, "no compilation target: the file has no frontmatter `target`")
                .with_suggestion("add a frontmatter block with `target: reactjs|vue|svelte|solid`, or configure a default target")
        })
}

type JobOutput = Result<CompiledModule, CompileError>;

/// A compile request, answered by [`CompilerSession::resolve`].
#[derive(Debug)]
pub struct PendingCompile {
    path: String,
    metadata: Option<FileMetadata>,
    state: PendingState,
    /// Shares a job another request already dispatched.
    joined: bool,
}

#[derive(Debug)]
enum PendingState {
    Ready(JobOutput),
    Running(JobHandle<JobOutput>),
}

impl PendingCompile {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn is_ready(&self) -> bool {
        match &self.state {
            PendingState::Ready(_) => true,
            PendingState::Running(handle) => handle.try_result().is_some(),
        }
    }
}

#[derive(Debug)]
struct InFlight {
    content_hash: blake3::Hash,
    handle: JobHandle<JobOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub total_files: usize,
    pub cached_files: usize,
    pub parsed_files: usize,
    /// Requests answered by a compilation another request started.
    pub joined_files: usize,
    /// Includes reparses answered with a stale module.
    pub failed_files: usize,
    pub stale_files: usize,
    /// `cached_files / total_files`.
    pub cache_hit_rate: f64,
    /// Mean over parsed files.
    pub average_parse_time: Duration,
    #[serde(skip)]
    total_parse_time: Duration,
}

impl Metrics {
    fn record(&mut self, outcome: &Result<CompiledModule, CompileError>, joined: bool) {
        self.total_files += 1;
        match outcome {
            Ok(module) if module.stale => {
                self.failed_files += 1;
                self.stale_files += 1;
            }
            Ok(module) if module.from_cache => self.cached_files += 1,
            Ok(_) if joined => self.joined_files += 1,
            Ok(module) => {
                self.parsed_files += 1;
                self.total_parse_time += module.parse_time;
            }
            Err(_) => self.failed_files += 1,
        }
        self.cache_hit_rate = self.cached_files as f64 / self.total_files as f64;
        self.average_parse_time = match u32::try_from(self.parsed_files) {
            Ok(n) if n > 0 => self.total_parse_time / n,
            _ => Duration::ZERO,
        };
    }
}

/// The aggregated result of one build invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub modules: Vec<CompiledModule>,
    pub errors: Vec<ErrorReport>,
    pub warnings: Vec<Warning>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug)]
pub struct CompilerSession {
    config: Arc<CompilerConfig>,
    cache: Cache,
    pool: WorkerPool,
    in_flight: AHashMap<String, InFlight>,
    metrics: Metrics,
}

impl CompilerSession {
    pub fn new(config: CompilerConfig) -> Result<Self> {
        let pool = WorkerPool::new(config.workers)?;
        Ok(Self {
            cache: Cache::new(config.cache_max_size),
            config: Arc::new(config),
            pool,
            in_flight: AHashMap::new(),
            metrics: Metrics::default(),
        })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of compilations dispatched and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Start compiling the file at `path`.
    pub fn submit(&mut self, path: &Path) -> PendingCompile {
        let key = path.to_string_lossy().into_owned();
        let source = match std::fs::read_to_string(path)
            .with_context(|| format!("Could not read source file {}", path.display()))
        {
            Ok(source) => source,
            Err(err) => {
                return PendingCompile {
                    state: PendingState::Ready(Err(CompileError::io(&key, &err))),
                    path: key,
                    metadata: None,
                    joined: false,
                };
            }
        };
        let mtime = match FileMetadata::modified(path) {
            Ok(mtime) => Some(mtime),
            Err(err) => {
                let err = CompileError::cache(&key, format!("{err:#}"));
                log::warn!("{err}; compiling without the cache");
                return self.dispatch(key, source, None);
            }
        };
        let metadata = FileMetadata::for_contents(&key, mtime, &source);
        self.submit_with(key, source, metadata)
    }

    /// Start compiling in-memory `source` as if it were the file `path`.
    pub fn submit_source(&mut self, path: &str, source: &str) -> PendingCompile {
        let metadata = FileMetadata::for_contents(path, None, source);
        self.submit_with(path.to_string(), source.to_string(), metadata)
    }

    fn submit_with(&mut self, key: String, source: String, metadata: FileMetadata) -> PendingCompile {
        match self.cache.lookup(&metadata) {
            Lookup::Hit(entry) => {
                tracing::debug!(file = %key, "cache hit");
                return PendingCompile {
                    state: PendingState::Ready(Ok(entry.module.served_from_cache())),
                    path: key,
                    metadata: None,
                    joined: false,
                };
            }
            Lookup::Stale(_) => tracing::debug!(file = %key, "cache entry is stale"),
            Lookup::Miss => {}
        }
        self.dispatch(key, source, Some(metadata))
    }

    fn dispatch(&mut self, key: String, source: String, metadata: Option<FileMetadata>) -> PendingCompile {
        let content_hash = crate::helpers::content_hash(source.as_bytes());
        if let Some(running) = self.in_flight.get(&key) {
            if running.content_hash == content_hash {
                tracing::debug!(file = %key, "joining in-flight compilation");
                return PendingCompile {
                    state: PendingState::Running(running.handle.clone()),
                    path: key,
                    metadata,
                    joined: true,
                };
            }
        }

        let config = Arc::clone(&self.config);
        let path = key.clone();
        let handle = self.pool.spawn(move || {
            let _span = tracing::info_span!("session.job", file = %path).entered();
            compile_module(&path, &source, &config)
        });
        self.in_flight.insert(
            key.clone(),
            InFlight {
                content_hash,
                handle: handle.clone(),
            },
        );
        PendingCompile {
            path: key,
            metadata,
            state: PendingState::Running(handle),
            joined: false,
        }
    }

    /// Wait for `pending`, merge the result into the cache and update the
    /// metrics. The job's time budget counts from when a worker started it.
    pub fn resolve(&mut self, pending: PendingCompile) -> Result<CompiledModule, CompileError> {
        let PendingCompile {
            path,
            metadata,
            state,
            joined,
        } = pending;
        let outcome = match state {
            PendingState::Ready(outcome) => outcome,
            PendingState::Running(handle) => {
                let waited = handle.wait(self.config.job_timeout());
                let finished = self
                    .in_flight
                    .get(&path)
                    .is_some_and(|f| metadata.as_ref().is_none_or(|m| m.content_hash == f.content_hash));
                if finished {
                    self.in_flight.remove(&path);
                }
                match waited {
                    Ok(result) => result.as_ref().clone(),
                    Err(JobError::Timeout) => Err(CompileError::timeout(&path, self.config.job_timeout())),
                    Err(JobError::Lost) => Err(CompileError::io(
                        &path,
                        &anyhow::anyhow!("the compiler worker stopped without a result"),
                    )),
                }
            }
        };

        let outcome = match outcome {
            Ok(module) => {
                if !module.from_cache {
                    if let Some(metadata) = metadata {
                        self.cache.insert(CacheEntry::new(Arc::new(module.clone()), metadata));
                    }
                }
                Ok(module)
            }
            Err(err) => self.degrade(&path, err),
        };
        self.metrics.record(&outcome, joined);
        outcome
    }

    /// Answer a failed compile with the last good one when configured to,
    /// otherwise drop the cached entry.
    fn degrade(&mut self, path: &str, err: CompileError) -> Result<CompiledModule, CompileError> {
        if self.config.stale_fallback {
            if let Some(entry) = self.cache.get(path) {
                log::warn!("{err}; keeping the last successful compilation of {path}");
                let mut module = entry.module.served_from_cache();
                module.stale = true;
                module.warnings.push(Warning::new(
                    WarningKind::StaleFallback {
                        reason: err.message.clone(),
                    },
                    path,
                    err.location,
                ));
                return Ok(module);
            }
        }
        self.cache.remove(path);
        Err(err)
    }

    pub fn compile_file(&mut self, path: &Path) -> Result<CompiledModule, CompileError> {
        let pending = self.submit(path);
        self.resolve(pending)
    }

    pub fn compile_source(&mut self, path: &str, source: &str) -> Result<CompiledModule, CompileError> {
        let pending = self.submit_source(path, source);
        self.resolve(pending)
    }

    /// Compile every path in parallel. A failing file is reported next to the
    /// others and never stops them.
    pub fn compile_batch<P: AsRef<Path>>(&mut self, paths: &[P]) -> BuildReport {
        let _span = tracing::info_span!("session.batch", files = paths.len()).entered();
        let pending: Vec<PendingCompile> = paths.iter().map(|p| self.submit(p.as_ref())).collect();

        let mut report = BuildReport::default();
        for job in pending {
            match self.resolve(job) {
                Ok(module) => {
                    report.errors.extend(module.target_errors.iter().map(CompileError::report));
                    report.warnings.extend(module.warnings.iter().cloned());
                    report.modules.push(module);
                }
                Err(err) => report.errors.push(err.report()),
            }
        }
        tracing::info!(
            modules = report.modules.len(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "batch finished"
        );
        report
    }

    /// Drop entries older than the configured TTL.
    pub fn sweep_expired(&mut self) -> usize {
        self.cache.sweep_expired(self.config.cache_ttl())
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Forget the cached compilation of `path`.
    pub fn invalidate(&mut self, path: &str) -> bool {
        self.cache.remove(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    const COUNTER: &str = "---\ntarget: reactjs\n---\n$counter! = 0\n$inc = () => $counter++\n\ntemplate(`\n  <button onclick={$inc}>{{$counter}}</button>\n`)\n";

    fn session(config: CompilerConfig) -> CompilerSession {
        CompilerSession::new(config).unwrap()
    }

    fn assert_send_sync<T: Send + Sync>() {}

    /// A component large enough that compiling it takes far longer than a
    /// few milliseconds.
    fn large_component() -> String {
        let mut src = String::from("---\ntarget: reactjs\n---\n");
        for i in 0..60_000 {
            src.push_str(&format!("$v{i}! = {i}\n"));
        }
        src
    }

    #[test]
    fn test_shared_types_are_send_sync() {
        assert_send_sync::<CompiledModule>();
        assert_send_sync::<CompilerSession>();
        assert_send_sync::<CompilerConfig>();
        assert_send_sync::<CompileError>();
    }

    #[test]
    fn test_unchanged_file_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Counter.mtm");
        fs::write(&path, COUNTER).unwrap();

        let mut s = session(CompilerConfig::builder().workers(2).build());
        let first = s.compile_file(&path).unwrap();
        assert!(!first.from_cache);
        assert!(first.output(Target::React).unwrap().code.contains("useState(0)"));

        let second = s.compile_file(&path).unwrap();
        assert!(second.from_cache);
        assert_eq!(second.parse_time, Duration::ZERO);
        assert_eq!(second.outputs, first.outputs);

        let m = s.metrics();
        assert_eq!((m.total_files, m.cached_files, m.parsed_files), (2, 1, 1));
        assert_eq!(m.cache_hit_rate, 0.5);
    }

    #[test]
    fn test_edit_triggers_reparse() {
        let mut s = session(CompilerConfig::default());
        s.compile_source("src/A.mtm", COUNTER).unwrap();
        let edited = COUNTER.replace("= 0", "= 5");
        let module = s.compile_source("src/A.mtm", &edited).unwrap();
        assert!(!module.from_cache);
        assert!(module.primary().unwrap().code.contains("useState(5)"));
        assert_eq!(s.cache().len(), 1);
    }

    #[test]
    fn test_in_flight_requests_are_joined() {
        let mut s = session(CompilerConfig::builder().workers(1).build());
        let a = s.submit_source("src/A.mtm", COUNTER);
        let b = s.submit_source("src/A.mtm", COUNTER);
        assert_eq!(s.in_flight(), 1);
        assert!(!a.is_joined());
        assert!(b.is_joined());
        let first = s.resolve(a).unwrap();
        let second = s.resolve(b).unwrap();
        assert_eq!(s.in_flight(), 0);
        assert_eq!(first.parse_time, second.parse_time);
        assert!(!second.from_cache);

        let m = s.metrics();
        assert_eq!((m.total_files, m.parsed_files, m.joined_files), (2, 1, 1));
        assert_eq!(m.average_parse_time, first.parse_time);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let mut s = session(CompilerConfig::default());
        s.compile_source("src/A.mtm", COUNTER).unwrap();
        let err = s.compile_source("src/A.mtm", "$a! = $b\n$b! = $a\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CircularDependency { .. }));
        assert!(!s.cache().contains("src/A.mtm"));
        assert_eq!(s.metrics().failed_files, 1);
    }

    #[test]
    fn test_stale_fallback_keeps_last_good_module() {
        let mut s = session(CompilerConfig::builder().stale_fallback(true).build());
        s.compile_source("src/A.mtm", COUNTER).unwrap();
        let broken = COUNTER.replace("{{$counter}}", "{{$counter +}}");
        let module = s.compile_source("src/A.mtm", &broken).unwrap();
        assert!(module.stale);
        assert!(module.from_cache);
        assert!(module
            .warnings
            .iter()
            .any(|w| matches!(w.kind, WarningKind::StaleFallback { .. })));
        assert!(s.cache().contains("src/A.mtm"));

        let m = s.metrics();
        assert_eq!((m.total_files, m.parsed_files, m.cached_files), (2, 1, 0));
        assert_eq!((m.failed_files, m.stale_files), (1, 1));
        assert_eq!(m.cache_hit_rate, 0.0);

        let recovered = s.compile_source("src/A.mtm", &COUNTER.replace("= 0", "= 1")).unwrap();
        assert!(!recovered.stale);
    }

    #[test]
    fn test_missing_target_is_a_frontmatter_error() {
        let mut s = session(CompilerConfig::default());
        let err = s.compile_source("src/A.mtm", "$a! = 1\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Frontmatter);
        assert!(err.suggestion.is_some());

        let mut s = session(CompilerConfig::builder().default_target(Target::Svelte).build());
        let module = s.compile_source("src/A.mtm", "$a! = 1\n").unwrap();
        assert!(module.output(Target::Svelte).is_some());
    }

    #[test]
    fn test_batch_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("Good.mtm");
        let bad = dir.path().join("Bad.mtm");
        let missing = dir.path().join("Missing.mtm");
        fs::write(&good, COUNTER).unwrap();
        fs::write(&bad, "---\ntarget: vue\n---\n$x!: string = 1\n").unwrap();

        let mut s = session(
            CompilerConfig::builder()
                .workers(3)
                .targets(vec![Target::React, Target::Svelte])
                .build(),
        );
        let report = s.compile_batch(&[&good, &bad, &missing]);
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].outputs.len(), 2);
        let kinds: Vec<&str> = report.errors.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["TypeConflictError", "IoError"]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_multi_target_errors_are_per_target() {
        let src = "---\ntarget: reactjs\nprops:\n  title: string\n---\n$rename = () => { $title = 'x' }\n";
        let mut s = session(CompilerConfig::builder().targets(Target::ALL.to_vec()).build());
        let module = s.compile_source("src/T.mtm", src).unwrap();
        assert_eq!(module.outputs.len(), 1);
        assert_eq!(module.outputs[0].target, Target::Svelte);
        assert_eq!(module.target_errors.len(), 3);
    }

    #[test]
    fn test_backend_warnings_reach_the_module() {
        let src = "---\ntarget: reactjs\n---\n$list! = []\n$add = () => { $list.push(1) }\n";
        let mut s = session(CompilerConfig::builder().targets(vec![Target::React, Target::Vue]).build());
        let module = s.compile_source("src/List.mtm", src).unwrap();
        assert_eq!(module.outputs.len(), 2);
        let codes: Vec<&str> = module.warnings.iter().map(|w| w.kind.code()).collect();
        assert_eq!(codes, vec!["in-place-mutation"]);
        assert!(module.warnings[0].message().contains("reactjs"));
    }

    #[test]
    fn test_timeout_is_reported_and_not_cached() {
        let mut s = session(CompilerConfig::builder().job_timeout_ms(0).workers(1).build());
        let err = s.compile_source("src/Slow.mtm", &large_component()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Timeout { .. }));
        assert_eq!(err.report().kind, "TimeoutError");
        assert!(!s.cache().contains("src/Slow.mtm"));
        assert_eq!(s.metrics().failed_files, 1);
    }

    #[test]
    fn test_timeout_fails_only_that_job() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("Big.mtm");
        let small = dir.path().join("Small.mtm");
        fs::write(&big, large_component()).unwrap();
        fs::write(&small, COUNTER).unwrap();

        // One worker: the small file queues behind the big one for the whole
        // time the big one runs, well past the budget.
        let mut s = session(CompilerConfig::builder().job_timeout_ms(30).workers(1).build());
        let report = s.compile_batch(&[&big, &small]);
        let failed: Vec<(&str, &str)> = report
            .errors
            .iter()
            .map(|e| (e.file.as_str(), e.kind.as_str()))
            .collect();
        assert_eq!(failed, vec![(big.to_str().unwrap(), "TimeoutError")]);
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].path, small.to_string_lossy());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut s = session(CompilerConfig::default());
        s.compile_source("src/A.mtm", COUNTER).unwrap();
        s.compile_source("src/B.mtm", COUNTER).unwrap();
        assert!(s.invalidate("src/A.mtm"));
        assert!(!s.invalidate("src/A.mtm"));
        assert_eq!(s.sweep_expired(), 0);
        s.clear_cache();
        assert!(s.cache().is_empty());
    }
}
