//! The execution engine: walks a parsed script and dispatches its commands.
//!
//! # Architecture
//!
//! ```text
//! execute(script) ──▶ run_nodes ──▶ run_node ──┬── Assignment / If / For / While / AndOr ...
//!                                              ├── Pipeline ──▶ wire + run_stages (one task per stage)
//!                                              └── Command  ──▶ run_simple
//!                                                                ├── expand words
//!                                                                ├── apply redirects
//!                                                                └── dispatch::resolve ──▶ invoke
//! ```
//!
//! The engine itself is cheap to clone: collaborators are shared behind
//! `Arc`s and interpreter state (functions, imports, `$?`, options) is kept
//! between `execute` calls so a REPL can build on earlier input.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::ast::{AndOr, Assignment, Command, Connective, For, FunctionDef, If, Node, Pipeline, Script, While};
use crate::builtins::{coerce_args, Builtin, BuiltinIo, BuiltinRegistry};
use crate::config::{EngineOptions, ShellConfig};
use crate::dispatch::{self, DispatchTarget, Intrinsic, Lookup};
use crate::env::EnvironmentManager;
use crate::error::{ExecutionError, ShellError, ShellResult};
use crate::interpreter::{render_word, CommandResult, ExecContext, ExecutionResult, Flow, Positional, Recorder, Scope, ShellOptions};
use crate::metrics::{ExecutionMetrics, MetricsSnapshot};
use crate::modules::{Module, ModuleResolver};
use crate::parser;
use crate::sandbox::{Action, SecurityChecker};
use crate::scheduler::{
    pipeline_status, run_process, run_stages, wire, CaptureBuffer, InputSource, OutputSink, ProcessIo, ProcessSpec,
    StageFuture,
};

/// Function calls nested deeper than this fail instead of exhausting the stack.
pub const MAX_CALL_DEPTH: u32 = 200;

pub(crate) type FlowFuture<'a> = Pin<Box<dyn Future<Output = ShellResult<Flow>> + Send + 'a>>;

/// Interprets scripts against an environment, a builtin registry, a module
/// resolver and a security checker.
#[derive(Clone)]
pub struct Engine {
    pub(crate) env: Arc<EnvironmentManager>,
    pub(crate) builtins: Arc<BuiltinRegistry>,
    pub(crate) modules: Arc<ModuleResolver>,
    pub(crate) security: Arc<SecurityChecker>,
    pub(crate) options: EngineOptions,
    metrics: Arc<ExecutionMetrics>,
    state: Arc<Mutex<Scope>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("builtins", &self.builtins.len())
            .finish_non_exhaustive()
    }
}

fn shell_options(options: &EngineOptions) -> ShellOptions {
    ShellOptions {
        errexit: options.errexit,
        pipefail: options.pipefail,
    }
}

impl Engine {
    pub fn new(
        env: Arc<EnvironmentManager>,
        builtins: Arc<BuiltinRegistry>,
        modules: Arc<ModuleResolver>,
        security: Arc<SecurityChecker>,
    ) -> Self {
        let options = EngineOptions::default();
        Self {
            state: Arc::new(Mutex::new(Scope::new(shell_options(&options)))),
            metrics: Arc::new(ExecutionMetrics::new()),
            env,
            builtins,
            modules,
            security,
            options,
        }
    }

    /// Replace the engine options. `errexit` and `pipefail` also reset the
    /// script-visible `set` state.
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.lock_state().options = shell_options(&options);
        self.options = options;
        self
    }

    /// Wire up an engine from configuration: process environment, the
    /// standard builtins and the configured module and security settings.
    pub fn from_config(config: &ShellConfig) -> Self {
        let env = Arc::new(EnvironmentManager::from_process());
        let modules = Arc::new(ModuleResolver::new(env.clone(), config.modules.clone()));
        Self::new(
            env,
            Arc::new(BuiltinRegistry::standard()),
            modules,
            Arc::new(SecurityChecker::new(config.security.clone())),
        )
        .with_options(config.engine.clone())
    }

    pub fn env(&self) -> &Arc<EnvironmentManager> {
        &self.env
    }

    pub fn builtins(&self) -> &Arc<BuiltinRegistry> {
        &self.builtins
    }

    pub fn modules(&self) -> &Arc<ModuleResolver> {
        &self.modules
    }

    pub fn security(&self) -> &Arc<SecurityChecker> {
        &self.security
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Counters accumulated by this engine and its clones.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Scope> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `$0` and `$1`.. for subsequent runs.
    pub fn set_positional(&self, zero: impl Into<String>, args: Vec<String>) {
        self.lock_state().positional = Positional {
            zero: zero.into(),
            args,
        };
    }

    /// Names of the functions defined at top level so far, sorted.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_state().functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// `$?` after the last run.
    pub fn last_status(&self) -> i32 {
        self.lock_state().last_status
    }

    /// The current `set -e` / `set -o pipefail` state.
    pub fn shell_options(&self) -> ShellOptions {
        self.lock_state().options
    }

    /// True when any loaded module exports `name`.
    pub async fn is_exported_function(&self, name: &str) -> bool {
        self.modules.is_exported_function(name).await
    }

    /// Parse and run `source`. A parse error is returned before anything runs.
    pub async fn execute_str(&self, cancel: &CancellationToken, source: &str) -> ShellResult<ExecutionResult> {
        let script = parser::parse(source)?;
        self.execute(cancel, &script).await
    }

    /// Run every top-level node in order.
    ///
    /// Command failures are reported in the result, never as `Err`; the only
    /// error is [`ExecutionError::Cancelled`]. Concurrent calls on clones of
    /// one engine each start from the persisted state; functions, imports
    /// and `set` options they change are merged back when each finishes.
    #[tracing::instrument(level = "info", skip(self, cancel, script), fields(nodes = script.nodes.len()))]
    pub async fn execute(&self, cancel: &CancellationToken, script: &Script) -> ShellResult<ExecutionResult> {
        let started = Instant::now();
        let (mut ctx, out, err) = self.top_level(cancel);
        let baseline = ctx.scope.clone();
        let recorder = ctx.recorder.clone();

        let outcome = self.run_nodes(&mut ctx, &script.nodes).await;
        if let Ok(Flow::Exit(code)) = outcome {
            ctx.scope.last_status = code;
        }
        let status = ctx.scope.last_status;
        self.store(&baseline, ctx.scope);
        let _ = ctx.stdout.flush().await;
        outcome?;

        let mut result = ExecutionResult::new(status);
        result.commands = recorder.map(|r| r.take()).unwrap_or_default();
        result.output = out.map(|b| b.to_string_lossy()).unwrap_or_default();
        result.error = err.map(|b| b.to_string_lossy()).unwrap_or_default();
        result.elapsed = started.elapsed();
        self.metrics.record_script(result.elapsed);
        debug!(status, elapsed_ms = result.elapsed.as_millis() as u64, "script finished");
        Ok(result)
    }

    /// Run exactly one command and return its result.
    #[tracing::instrument(level = "info", skip(self, cancel, command), fields(command = %render_word(&command.name)))]
    pub async fn execute_command(&self, cancel: &CancellationToken, command: &Command) -> ShellResult<CommandResult> {
        let started = Instant::now();
        let (mut ctx, _, _) = self.top_level(cancel);
        let baseline = ctx.scope.clone();
        let recorder = ctx.recorder.clone();

        let outcome = self.run_simple(&mut ctx, command).await;
        if let Ok(Flow::Exit(code)) = outcome {
            ctx.scope.last_status = code;
        }
        let status = ctx.scope.last_status;
        self.store(&baseline, ctx.scope);
        outcome?;
        self.metrics.record_script(started.elapsed());

        let recorded = recorder.and_then(|r| r.take().pop());
        Ok(recorded.unwrap_or_else(|| {
            let mut rendered = render_word(&command.name);
            for arg in &command.args {
                rendered.push(' ');
                rendered.push_str(&render_word(arg));
            }
            CommandResult::new(rendered, status)
        }))
    }

    /// A context over the top-level streams and the persisted state.
    fn top_level(&self, cancel: &CancellationToken) -> (ExecContext, Option<CaptureBuffer>, Option<CaptureBuffer>) {
        let (stdin, stdout, stderr, out, err) = if self.options.interactive {
            (InputSource::stdin(), OutputSink::stdout(), OutputSink::stderr(), None, None)
        } else {
            let (stdout, out) = OutputSink::capture();
            let (stderr, err) = OutputSink::capture();
            (InputSource::empty(), stdout, stderr, Some(out), Some(err))
        };
        let recorder = Recorder::new(
            out.clone().map(|b| (stdout.clone(), b)),
            err.clone().map(|b| (stderr.clone(), b)),
        );
        let scope = self.lock_state().clone();
        let mut ctx = ExecContext::new(self.env.clone(), stdin, stdout, stderr, scope, cancel.clone());
        ctx.recorder = Some(recorder);
        (ctx, out, err)
    }

    /// Fold what this run changed relative to `baseline` into the persisted
    /// scope, so runs overlapping on clones of one engine keep each other's
    /// definitions. `$?` is last writer wins.
    fn store(&self, baseline: &Scope, scope: Scope) {
        self.lock_state().merge_from(baseline, scope);
    }

    /// Run a statement list, stopping on control flow, errexit or cancellation.
    pub(crate) fn run_nodes<'a>(&'a self, ctx: &'a mut ExecContext, nodes: &'a [Node]) -> FlowFuture<'a> {
        Box::pin(async move {
            for node in nodes {
                ctx.check_cancel()?;
                ctx.errexit_exempt = false;
                let flow = self.run_node(ctx, node).await?;
                if flow != Flow::Normal {
                    return Ok(flow);
                }
                if ctx.should_errexit() {
                    debug!(status = ctx.scope.last_status, position = ?node.position(), "errexit");
                    return Ok(Flow::Exit(ctx.scope.last_status));
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn run_node<'a>(&'a self, ctx: &'a mut ExecContext, node: &'a Node) -> FlowFuture<'a> {
        Box::pin(async move {
            match node {
                Node::Script(group) => self.run_nodes(ctx, &group.nodes).await,
                Node::Command(command) => self.run_simple(ctx, command).await,
                Node::Assignment(assignment) => {
                    self.assign(ctx, assignment).await?;
                    Ok(Flow::Normal)
                }
                Node::Pipeline(pipeline) => self.run_pipeline(ctx, pipeline).await,
                Node::AndOr(list) => self.run_and_or(ctx, list).await,
                Node::If(stmt) => self.run_if(ctx, stmt).await,
                Node::For(stmt) => self.run_for(ctx, stmt).await,
                Node::While(stmt) => self.run_while(ctx, stmt).await,
                Node::FunctionDef(def) => {
                    trace!(name = %def.name, "function defined");
                    ctx.scope.functions.insert(def.name.clone(), def.clone());
                    Ok(ctx.status(0))
                }
                Node::Subshell(sub) => {
                    let mut child = ctx.subshell();
                    let flow = self.run_nodes(&mut child, &sub.body).await?;
                    let status = match flow {
                        Flow::Exit(code) => code,
                        _ => child.scope.last_status,
                    };
                    Ok(ctx.status(status))
                }
                Node::Break(count) => self.control(ctx, Intrinsic::Break, count.as_ref()).await,
                Node::Continue(count) => self.control(ctx, Intrinsic::Continue, count.as_ref()).await,
                Node::Return(code) => self.control(ctx, Intrinsic::Return, code.as_ref()).await,
                Node::Exit(code) => self.control(ctx, Intrinsic::Exit, code.as_ref()).await,
            }
        })
    }

    async fn control(
        &self,
        ctx: &mut ExecContext,
        intrinsic: Intrinsic,
        arg: Option<&crate::ast::Word>,
    ) -> ShellResult<Flow> {
        let args = match arg {
            Some(word) => self.expand_words(ctx, std::slice::from_ref(word)).await?,
            None => Vec::new(),
        };
        self.run_intrinsic(ctx, intrinsic, &args).await
    }

    async fn assign(&self, ctx: &mut ExecContext, assignment: &Assignment) -> ShellResult<()> {
        ctx.subst_status = None;
        let value = self.expand_single(ctx, &assignment.value).await?;
        trace!(name = %assignment.name, "assign");
        ctx.env.set_env(&assignment.name, value);
        ctx.scope.last_status = ctx.subst_status.take().unwrap_or(0);
        Ok(())
    }

    async fn run_and_or(&self, ctx: &mut ExecContext, list: &AndOr) -> ShellResult<Flow> {
        let count = list.tail.len();
        let flow = self.run_operand(ctx, &list.head, count == 0).await?;
        if flow != Flow::Normal {
            return Ok(flow);
        }
        let mut ran_last = count == 0;
        for (index, (connective, node)) in list.tail.iter().enumerate() {
            let succeeded = ctx.scope.last_status == 0;
            let run = match connective {
                Connective::And => succeeded,
                Connective::Or => !succeeded,
            };
            if !run {
                continue;
            }
            let is_last = index + 1 == count;
            let flow = self.run_operand(ctx, node, is_last).await?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
            ran_last = is_last;
        }
        if !ran_last {
            ctx.errexit_exempt = true;
        }
        Ok(Flow::Normal)
    }

    /// One operand of `&&`/`||`; only the final one is subject to errexit.
    async fn run_operand(&self, ctx: &mut ExecContext, node: &Node, is_last: bool) -> ShellResult<Flow> {
        ctx.errexit_exempt = false;
        if is_last {
            return self.run_node(ctx, node).await;
        }
        ctx.conditional += 1;
        let flow = self.run_node(ctx, node).await;
        ctx.conditional -= 1;
        flow
    }

    async fn run_condition(&self, ctx: &mut ExecContext, cond: &[Node]) -> ShellResult<Flow> {
        ctx.conditional += 1;
        let flow = self.run_nodes(ctx, cond).await;
        ctx.conditional -= 1;
        flow
    }

    async fn run_if(&self, ctx: &mut ExecContext, stmt: &If) -> ShellResult<Flow> {
        let flow = self.run_condition(ctx, &stmt.cond).await?;
        if flow != Flow::Normal {
            return Ok(flow);
        }
        if ctx.scope.last_status == 0 {
            self.run_nodes(ctx, &stmt.then_branch).await
        } else if let Some(branch) = &stmt.else_branch {
            self.run_nodes(ctx, branch).await
        } else {
            Ok(ctx.status(0))
        }
    }

    /// Run one loop iteration body and translate its control flow.
    async fn run_body(&self, ctx: &mut ExecContext, body: &[Node]) -> ShellResult<LoopStep> {
        ctx.scope.loop_depth += 1;
        let flow = self.run_nodes(ctx, body).await;
        ctx.scope.loop_depth -= 1;
        Ok(match flow? {
            Flow::Normal => LoopStep::Next,
            Flow::Continue(n) if n <= 1 => LoopStep::Next,
            Flow::Break(n) if n <= 1 => LoopStep::Break,
            Flow::Continue(n) => LoopStep::Leave(Flow::Continue(n - 1)),
            Flow::Break(n) => LoopStep::Leave(Flow::Break(n - 1)),
            other => LoopStep::Leave(other),
        })
    }

    async fn run_for(&self, ctx: &mut ExecContext, stmt: &For) -> ShellResult<Flow> {
        let items = self.expand_words(ctx, &stmt.items).await?;
        trace!(var = %stmt.var, items = items.len(), "for");
        let mut iterations = 0;
        let outcome = self.for_items(ctx, stmt, items, &mut iterations).await;
        self.metrics.record_loop(iterations);
        outcome
    }

    async fn for_items(
        &self,
        ctx: &mut ExecContext,
        stmt: &For,
        items: Vec<String>,
        iterations: &mut u64,
    ) -> ShellResult<Flow> {
        let mut status = 0;
        for item in items {
            ctx.check_cancel()?;
            ctx.env.set_env(&stmt.var, item);
            *iterations += 1;
            let step = self.run_body(ctx, &stmt.body).await?;
            status = ctx.scope.last_status;
            match step {
                LoopStep::Next => {}
                LoopStep::Break => break,
                LoopStep::Leave(flow) => return Ok(flow),
            }
        }
        Ok(ctx.status(status))
    }

    async fn run_while(&self, ctx: &mut ExecContext, stmt: &While) -> ShellResult<Flow> {
        let mut iterations = 0;
        let outcome = self.while_iterations(ctx, stmt, &mut iterations).await;
        self.metrics.record_loop(iterations);
        outcome
    }

    async fn while_iterations(&self, ctx: &mut ExecContext, stmt: &While, iterations: &mut u64) -> ShellResult<Flow> {
        let mut status = 0;
        loop {
            ctx.check_cancel()?;
            let flow = self.run_condition(ctx, &stmt.cond).await?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
            if ctx.scope.last_status != 0 {
                break;
            }
            *iterations += 1;
            let step = self.run_body(ctx, &stmt.body).await?;
            status = ctx.scope.last_status;
            match step {
                LoopStep::Next => {}
                LoopStep::Break => break,
                LoopStep::Leave(flow) => return Ok(flow),
            }
        }
        Ok(ctx.status(status))
    }

    /// Run all stages concurrently, each against a private copy of the
    /// environment.
    #[tracing::instrument(level = "debug", skip_all, fields(stages = pipeline.stages.len(), negated = pipeline.negated))]
    async fn run_pipeline(&self, ctx: &mut ExecContext, pipeline: &Pipeline) -> ShellResult<Flow> {
        let count = pipeline.stages.len();
        let flow = if count == 1 {
            self.run_simple(ctx, &pipeline.stages[0]).await?
        } else {
            let mark = ctx.recorder.as_ref().map(Recorder::mark);
            let (ios, closers) = wire(count, ctx.stdin.clone(), ctx.stdout.clone());
            let mut stages: Vec<StageFuture> = Vec::with_capacity(count);
            for (index, (io, command)) in ios.into_iter().zip(&pipeline.stages).enumerate() {
                let mut stage = ctx.clone();
                stage.env = ctx.env.fork();
                stage.stdin = io.stdin;
                stage.stdout = io.stdout;
                stage.recorder = None;
                stage.scope.loop_depth = 0;
                let engine = self.clone();
                let command = command.clone();
                let last = index + 1 == count;
                stages.push(Box::pin(async move {
                    let outcome = engine.run_simple(&mut stage, &command).await;
                    if !last {
                        stage.stdout.close().await;
                    }
                    if index > 0 {
                        stage.stdin.close().await;
                    }
                    Ok(match outcome? {
                        Flow::Exit(code) => code,
                        _ => stage.scope.last_status,
                    })
                }));
            }

            let statuses = run_stages(stages, closers, &ctx.cancel, self.options.kill_grace()).await?;
            let status = pipeline_status(&statuses, ctx.scope.options.pipefail);
            debug!(?statuses, status, "pipeline finished");
            self.metrics.record_pipeline(status);
            ctx.scope.last_status = status;

            if let (Some(recorder), Some(mark)) = (&ctx.recorder, mark) {
                let described = pipeline
                    .stages
                    .iter()
                    .map(describe_command)
                    .collect::<Vec<_>>()
                    .join(" | ");
                recorder.record(mark, &ctx.stdout, &ctx.stderr, CommandResult::new(described, status));
            }
            Flow::Normal
        };

        if pipeline.negated {
            let status = if ctx.scope.last_status == 0 { 1 } else { 0 };
            ctx.scope.last_status = status;
            ctx.errexit_exempt = true;
        }
        Ok(flow)
    }

    /// Expand, redirect, resolve and invoke one simple command.
    async fn run_simple(&self, ctx: &mut ExecContext, command: &Command) -> ShellResult<Flow> {
        ctx.check_cancel()?;
        let started = Instant::now();
        let mark = ctx.recorder.as_ref().map(Recorder::mark);
        ctx.subst_status = None;
        let mut words = self.expand_words(ctx, std::slice::from_ref(&command.name)).await?;
        words.extend(self.expand_words(ctx, &command.args).await?);

        if words.is_empty() {
            let status = ctx.subst_status.unwrap_or(0);
            ctx.scope.last_status = status;
            for assignment in &command.prefix {
                self.assign(ctx, assignment).await?;
            }
            return Ok(Flow::Normal);
        }
        let name = words.remove(0);
        let args = words;

        let saved_env = if command.prefix.is_empty() {
            None
        } else {
            let scoped = ctx.env.fork();
            for assignment in &command.prefix {
                let value = self.expand_single(ctx, &assignment.value).await?;
                scoped.set_env(&assignment.name, value);
            }
            Some(std::mem::replace(&mut ctx.env, scoped))
        };
        let saved = (ctx.stdin.clone(), ctx.stdout.clone(), ctx.stderr.clone());

        let target = dispatch::resolve(
            &name,
            &Lookup {
                functions: &ctx.scope.functions,
                imports: &ctx.scope.imports,
                modules: &self.modules,
                builtins: &self.builtins,
                env: &ctx.env,
            },
        )
        .await;
        let kind = target.kind();
        debug!(command = %name, args = args.len(), ?kind, "dispatch");

        let outcome = match self.apply_redirects(ctx, &command.redirects).await {
            Ok(opened) => {
                let outcome = self.invoke(ctx, target, &name, &args).await;
                for sink in opened {
                    sink.close().await;
                }
                outcome
            }
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(flow) => Ok((flow, None)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                ctx.report(&e).await;
                ctx.scope.last_status = e.exit_code();
                Ok((Flow::Normal, Some(e.kind())))
            }
        };
        match &result {
            Ok((_, error_kind)) => {
                self.metrics
                    .record_command(kind, *error_kind, ctx.scope.last_status, started.elapsed())
            }
            Err(_) => self.metrics.record_cancelled(),
        }

        if let (Ok((_, error_kind)), Some(recorder), Some(mark)) = (&result, &ctx.recorder, mark) {
            let mut rendered = name;
            for arg in &args {
                rendered.push(' ');
                rendered.push_str(arg);
            }
            let mut record = CommandResult::new(rendered, ctx.scope.last_status);
            record.kind = kind;
            record.error_kind = *error_kind;
            recorder.record(mark, &ctx.stdout, &ctx.stderr, record);
        }

        let (stdin, stdout, stderr) = saved;
        ctx.stdin = stdin;
        ctx.stdout = stdout;
        ctx.stderr = stderr;
        if let Some(env) = saved_env {
            ctx.env = env;
        }
        result.map(|(flow, _)| flow)
    }

    async fn invoke(
        &self,
        ctx: &mut ExecContext,
        target: DispatchTarget,
        name: &str,
        args: &[String],
    ) -> ShellResult<Flow> {
        match target {
            DispatchTarget::Intrinsic(intrinsic) => self.run_intrinsic(ctx, intrinsic, args).await,
            DispatchTarget::UserFunction(def) => self.call_function(ctx, &def, args).await,
            DispatchTarget::ModuleExport { module, function } => {
                self.call_export(ctx, &module, &function, args).await
            }
            DispatchTarget::Builtin(builtin) => {
                let code = self.call_builtin(ctx, builtin.as_ref(), args).await?;
                Ok(ctx.status(code))
            }
            DispatchTarget::External(program) => {
                let code = self.spawn_external(ctx, name, program, args).await?;
                Ok(ctx.status(code))
            }
            DispatchTarget::NotFound => Err(ShellError::CommandNotFound {
                name: name.to_string(),
                args: args.to_vec(),
            }),
        }
    }

    /// Run a user function in a child environment. Only names the body
    /// `export`s are copied back.
    async fn call_function(&self, ctx: &mut ExecContext, def: &FunctionDef, args: &[String]) -> ShellResult<Flow> {
        let scope = ctx.scope.for_call(args.to_vec());
        check_depth(&scope, &def.name)?;
        let env = ctx.env.fork();
        let mut call = self.call_context(ctx, env.clone(), scope);

        let flow = self.run_nodes(&mut call, &def.body).await?;
        if !call.scope.exports.is_empty() {
            ctx.env.merge_vars(&env.create_session(), &call.scope.exports);
            if ctx.scope.in_function {
                for name in &call.scope.exports {
                    ctx.scope.mark_exported(name);
                }
            }
        }
        Ok(finish_call(ctx, flow, call.scope.last_status))
    }

    /// Run a module export against the module's load-time environment, with
    /// the module's own functions in scope.
    async fn call_export(
        &self,
        ctx: &mut ExecContext,
        module: &Module,
        function: &FunctionDef,
        args: &[String],
    ) -> ShellResult<Flow> {
        let mut scope = ctx.scope.for_call(args.to_vec());
        check_depth(&scope, &function.name)?;
        scope.functions = module.functions.clone();
        scope.imports = Vec::new();
        let env = EnvironmentManager::from_session(module.base_env.clone());
        let mut call = self.call_context(ctx, env, scope);
        trace!(module = %module.name, function = %function.name, "module export");

        let flow = self.run_nodes(&mut call, &function.body).await?;
        Ok(finish_call(ctx, flow, call.scope.last_status))
    }

    fn call_context(&self, ctx: &ExecContext, env: Arc<EnvironmentManager>, scope: Scope) -> ExecContext {
        let mut call = ExecContext::new(
            env,
            ctx.stdin.clone(),
            ctx.stdout.clone(),
            ctx.stderr.clone(),
            scope,
            ctx.cancel.clone(),
        );
        call.conditional = ctx.conditional;
        call
    }

    /// Coerce, check every declared action, then call.
    async fn call_builtin(&self, ctx: &mut ExecContext, builtin: &dyn Builtin, args: &[String]) -> ShellResult<i32> {
        let signature = builtin.signature();
        let values = coerce_args(&signature, args)?;
        let cwd = ctx.env.working_dir();
        for action in builtin.actions(&values, &cwd) {
            self.security.enforce(&action)?;
        }
        let mut io = BuiltinIo::new(
            ctx.stdin.clone(),
            ctx.stdout.clone(),
            ctx.stderr.clone(),
            ctx.env.clone(),
            ctx.cancel.clone(),
        );
        builtin.call(values, &mut io).await
    }

    /// Security-check and spawn an external program.
    async fn spawn_external(
        &self,
        ctx: &mut ExecContext,
        name: &str,
        program: std::path::PathBuf,
        args: &[String],
    ) -> ShellResult<i32> {
        self.security.enforce(&Action::SpawnProcess {
            path: program.clone(),
            args: args.to_vec(),
        })?;
        let spec = ProcessSpec {
            name: name.to_string(),
            program,
            args: args.to_vec(),
            env: ctx.env.vars_for_process(),
            cwd: ctx.env.working_dir(),
        };
        let io = ProcessIo {
            stdin: ctx.stdin.clone(),
            stdout: ctx.stdout.clone(),
            stderr: ctx.stderr.clone(),
            inherit: self.options.interactive,
        };
        run_process(&spec, io, &ctx.cancel, self.options.kill_grace()).await
    }
}

enum LoopStep {
    Next,
    Break,
    Leave(Flow),
}

fn check_depth(scope: &Scope, name: &str) -> ShellResult<()> {
    if scope.depth > MAX_CALL_DEPTH {
        return Err(ShellError::Execution(ExecutionError::Internal(format!(
            "{name}: maximum function nesting depth ({MAX_CALL_DEPTH}) exceeded"
        ))));
    }
    Ok(())
}

/// `$?` and flow in the caller after a function body finished with `flow`.
fn finish_call(ctx: &mut ExecContext, flow: Flow, status: i32) -> Flow {
    match flow {
        Flow::Exit(code) => {
            ctx.scope.last_status = code;
            Flow::Exit(code)
        }
        _ => ctx.status(status),
    }
}

fn describe_command(command: &Command) -> String {
    std::iter::once(&command.name)
        .chain(&command.args)
        .map(render_word)
        .collect::<Vec<_>>()
        .join(" ")
}
