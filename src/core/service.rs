// Background alert loop.
//
// One task owns the engine; everything else talks to it over a channel, so
// dispatches, interactions and fade re-checks never overlap. Within a turn,
// queued commands go first, then interactions from the environment feed,
// then re-checks that have come due.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::alerts::engine::{AlertEngine, DispatchOutcome};
use super::alerts::rules::{Placement, Rule};
use super::alerts::styles::StyleDefinition;
use super::alerts::tracker::FadeReport;
use super::config::Settings;
use super::error::AlertError;
use super::model::{AlertRequest, ContextId};

const COMMAND_BUFFER: usize = 64;

enum LoopCommand {
    Alert(AlertRequest, oneshot::Sender<Result<DispatchOutcome, AlertError>>),
    Interaction(ContextId),
    RemoveAlerts(ContextId),
    Clear,
    AddRule(Rule, Placement),
    SetUserRules(Vec<Rule>),
    DefineStyle(StyleDefinition),
    UpdateSettings(Settings),
    Shutdown,
}

/// Cloneable handle to a running alert loop.
#[derive(Clone)]
pub struct AlertHandle {
    tx: mpsc::Sender<LoopCommand>,
}

impl AlertHandle {
    /// Dispatch an alert and wait for its initial delivery.
    pub async fn alert(&self, request: AlertRequest) -> Result<DispatchOutcome, AlertError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LoopCommand::Alert(request, reply_tx)).await?;
        reply_rx.await.map_err(|_| AlertError::ServiceClosed)?
    }

    /// Report that the user acted in `context`.
    pub async fn interaction(&self, context: impl Into<ContextId>) -> Result<(), AlertError> {
        self.send(LoopCommand::Interaction(context.into())).await
    }

    /// Take down every alert shown for `context`.
    pub async fn remove_alerts(&self, context: impl Into<ContextId>) -> Result<(), AlertError> {
        self.send(LoopCommand::RemoveAlerts(context.into())).await
    }

    pub async fn clear(&self) -> Result<(), AlertError> {
        self.send(LoopCommand::Clear).await
    }

    pub async fn add_rule(&self, rule: Rule, placement: Placement) -> Result<(), AlertError> {
        self.send(LoopCommand::AddRule(rule, placement)).await
    }

    pub async fn set_user_rules(&self, rules: Vec<Rule>) -> Result<(), AlertError> {
        self.send(LoopCommand::SetUserRules(rules)).await
    }

    pub async fn define_style(&self, style: StyleDefinition) -> Result<(), AlertError> {
        self.send(LoopCommand::DefineStyle(style)).await
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<(), AlertError> {
        self.send(LoopCommand::UpdateSettings(settings)).await
    }

    /// Stop the loop. Alerts still on screen are left as they are.
    pub async fn shutdown(&self) -> Result<(), AlertError> {
        self.send(LoopCommand::Shutdown).await
    }

    async fn send(&self, command: LoopCommand) -> Result<(), AlertError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AlertError::ServiceClosed)
    }
}

pub struct AlertService;

impl AlertService {
    /// Start the loop on the current tokio runtime.
    ///
    /// Remover failures happen outside any caller's stack; they are logged
    /// and forwarded to `errors`. If the engine's environment offers an
    /// interaction feed, the loop subscribes to it here.
    pub fn spawn(
        engine: AlertEngine,
        errors: mpsc::UnboundedSender<AlertError>,
    ) -> (AlertHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let interactions = engine.probe().subscribe_interactions();
        let task = tokio::spawn(run_loop(engine, rx, interactions, errors));
        (AlertHandle { tx }, task)
    }
}

async fn run_loop(
    mut engine: AlertEngine,
    mut rx: mpsc::Receiver<LoopCommand>,
    mut interactions: Option<mpsc::UnboundedReceiver<ContextId>>,
    errors: mpsc::UnboundedSender<AlertError>,
) {
    log::info!(
        "Alert loop started (interaction feed: {})",
        interactions.is_some()
    );

    loop {
        let deadline = engine.next_deadline().map(Instant::from_std);

        tokio::select! {
            biased;

            command = rx.recv() => {
                let Some(command) = command else { break };
                if !apply(&mut engine, command, &errors) {
                    break;
                }
            }

            context = next_interaction(&mut interactions) => match context {
                Some(context) => forward(engine.handle_interaction(&context), &errors),
                None => {
                    log::debug!("Interaction feed closed");
                    interactions = None;
                }
            },

            _ = wait_for(deadline) => {
                let report = engine.tick(Instant::now().into_std());
                forward(report, &errors);
            }
        }
    }

    log::info!("Alert loop stopped with {} active alerts", engine.tracker().len());
}

/// Returns false when the loop should stop.
fn apply(
    engine: &mut AlertEngine,
    command: LoopCommand,
    errors: &mpsc::UnboundedSender<AlertError>,
) -> bool {
    match command {
        LoopCommand::Alert(request, reply) => {
            let result = engine.dispatch_at(request, Instant::now().into_std());
            if let Err(e) = &result {
                log::warn!("Alert dispatch failed: {}", e);
            }
            // The caller may have stopped waiting
            let _ = reply.send(result);
        }
        LoopCommand::Interaction(context) => {
            forward(engine.handle_interaction(&context), errors);
        }
        LoopCommand::RemoveAlerts(context) => {
            forward(engine.remove_alerts(&context), errors);
        }
        LoopCommand::Clear => forward(engine.clear(), errors),
        LoopCommand::AddRule(rule, placement) => engine.add_rule(rule, placement),
        LoopCommand::SetUserRules(rules) => engine.set_user_rules(rules),
        LoopCommand::DefineStyle(style) => engine.define_style(style),
        LoopCommand::UpdateSettings(settings) => engine.update_settings(settings),
        LoopCommand::Shutdown => return false,
    }
    true
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn next_interaction(
    interactions: &mut Option<mpsc::UnboundedReceiver<ContextId>>,
) -> Option<ContextId> {
    match interactions {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn forward(report: FadeReport, errors: &mpsc::UnboundedSender<AlertError>) {
    for e in report.errors {
        let _ = errors.send(e);
    }
}
