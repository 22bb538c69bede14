//! 重连监督
//!
//! 状态机：`STOPPED → STARTING → RUNNING → (传输错误) → RECONNECT_SCHEDULED → STARTING → …`
//!
//! 每次传输错误只调度一个单次定时器，固定间隔、不限次数。`stop()` 递增代数，
//! 任何在 `stop()` 之后才完成的连接、定时器或采集循环都会因代数不符而放弃。

use crate::connector::{AcquireEvent, Connector, PayloadTx, Protocol};
use crate::error::ConnectorError;
use async_trait::async_trait;
use domain::{ConnectorPhase, ConnectorStatus, InterfaceType};
use historian_pipeline::ReadingSender;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct SupervisorState {
    phase: ConnectorPhase,
    generation: u64,
    last_activity: Option<i64>,
    last_error: Option<String>,
    reconnect_attempts: u64,
    readings_produced: u64,
    acquisition: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

struct Shared<P: Protocol> {
    protocol: P,
    sender: ReadingSender,
    state: Mutex<SupervisorState>,
}

impl<P: Protocol> Shared<P> {
    fn state(&self) -> MutexGuard<'_, SupervisorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 受监督的连接器：把任意 [`Protocol`] 包装为 [`Connector`]。
pub struct SupervisedConnector<P: Protocol> {
    shared: Arc<Shared<P>>,
}

impl<P: Protocol> SupervisedConnector<P> {
    pub fn new(protocol: P, sender: ReadingSender) -> Self {
        Self {
            shared: Arc::new(Shared {
                protocol,
                sender,
                state: Mutex::new(SupervisorState {
                    phase: ConnectorPhase::Stopped,
                    generation: 0,
                    last_activity: None,
                    last_error: None,
                    reconnect_attempts: 0,
                    readings_produced: 0,
                    acquisition: None,
                    timer: None,
                }),
            }),
        }
    }

    pub fn protocol(&self) -> &P {
        &self.shared.protocol
    }
}

impl<P: Protocol> Drop for SupervisedConnector<P> {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if let Some(acquisition) = state.acquisition.take() {
            acquisition.abort();
        }
    }
}

#[async_trait]
impl<P: Protocol> Connector for SupervisedConnector<P> {
    fn source_id(&self) -> i64 {
        self.shared.protocol.source_id()
    }

    fn kind(&self) -> InterfaceType {
        P::KIND
    }

    async fn start(&self) {
        start(self.shared.clone(), None).await;
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        let (acquisition, timer) = {
            let mut state = self.shared.state();
            if state.phase == ConnectorPhase::Stopped
                && state.acquisition.is_none()
                && state.timer.is_none()
            {
                return Ok(());
            }
            state.generation += 1;
            state.phase = ConnectorPhase::Stopped;
            (state.acquisition.take(), state.timer.take())
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        let mut result = Ok(());
        if let Some(acquisition) = acquisition {
            acquisition.abort();
            if let Err(err) = acquisition.await {
                if err.is_panic() {
                    result = Err(ConnectorError::Transport(
                        "acquisition task panicked".to_string(),
                    ));
                }
            }
        }
        self.shared.sender.gate().close().await;

        info!(
            target: "historian.protocol",
            source_id = self.shared.protocol.source_id(),
            kind = %P::KIND,
            "source_stopped"
        );
        result
    }

    fn status(&self) -> ConnectorStatus {
        let state = self.shared.state();
        ConnectorStatus {
            source_id: self.shared.protocol.source_id(),
            interface_type: P::KIND,
            phase: state.phase,
            is_running: state.phase == ConnectorPhase::Running,
            last_activity: state.last_activity,
            last_error: state.last_error.clone(),
            reconnect_pending: state.phase == ConnectorPhase::ReconnectScheduled,
            reconnect_attempts: state.reconnect_attempts,
            readings_produced: state.readings_produced,
        }
    }
}

/// `retry_of` 为重连定时器所属的代数；手动调用时为 `None`。
fn start<P: Protocol>(shared: Arc<Shared<P>>, retry_of: Option<u64>) -> BoxFuture {
    Box::pin(async move {
        let generation = {
            let mut state = shared.state();
            if let Some(expected) = retry_of {
                // 定时器到期前已被 stop() 或手动 start() 取代
                if state.generation != expected || state.phase != ConnectorPhase::ReconnectScheduled {
                    return;
                }
            }
            match state.phase {
                ConnectorPhase::Starting | ConnectorPhase::Running => return,
                ConnectorPhase::ReconnectScheduled => {
                    let timer = state.timer.take();
                    // 定时器自身调用时只释放句柄，不能中止当前任务
                    if let (Some(timer), None) = (timer, retry_of) {
                        timer.abort();
                    }
                }
                ConnectorPhase::Stopped => {}
            }
            state.phase = ConnectorPhase::Starting;
            state.generation += 1;
            state.generation
        };
        let source_id = shared.protocol.source_id();
        debug!(target: "historian.protocol", source_id, kind = %P::KIND, "source_connecting");

        let connected = shared.protocol.connect().await;

        let mut state = shared.state();
        if state.generation != generation {
            // 连接期间已被停止或替换，丢弃会话
            return;
        }
        match connected {
            Ok(session) => {
                let epoch = shared.sender.gate().open();
                state.phase = ConnectorPhase::Running;
                state.last_error = None;
                state.acquisition = Some(tokio::spawn(run_acquisition(
                    shared.clone(),
                    session,
                    generation,
                    epoch,
                )));
                drop(state);
                historian_telemetry::record_connector_start();
                info!(target: "historian.protocol", source_id, kind = %P::KIND, "source_started");
            }
            Err(err) => schedule_reconnect(&shared, &mut state, generation, err.to_string()),
        }
    })
}

fn schedule_reconnect<P: Protocol>(
    shared: &Arc<Shared<P>>,
    state: &mut SupervisorState,
    generation: u64,
    error: String,
) {
    let interval = shared.protocol.reconnect_interval();
    state.phase = ConnectorPhase::ReconnectScheduled;
    state.reconnect_attempts += 1;
    warn!(
        target: "historian.protocol",
        source_id = shared.protocol.source_id(),
        kind = %P::KIND,
        error = %error,
        attempt = state.reconnect_attempts,
        delay_ms = interval.as_millis() as u64,
        "reconnect_scheduled"
    );
    state.last_error = Some(error);

    let timer_shared = shared.clone();
    state.timer = Some(tokio::spawn(async move {
        tokio::time::sleep(interval).await;
        start(timer_shared, Some(generation)).await;
    }));
    historian_telemetry::record_reconnect_scheduled();
}

async fn run_acquisition<P: Protocol>(
    shared: Arc<Shared<P>>,
    session: P::Session,
    generation: u64,
    epoch: u64,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = {
        let acquire = shared.protocol.acquire(session, PayloadTx::new(tx));
        tokio::pin!(acquire);
        loop {
            tokio::select! {
                result = &mut acquire => break result,
                Some(event) = rx.recv() => handle_event(&shared, generation, epoch, event),
            }
        }
    };
    // 传输结束前已上报的负载按顺序处理完
    while let Ok(event) = rx.try_recv() {
        handle_event(&shared, generation, epoch, event);
    }

    let error = match result {
        Ok(()) => "transport closed".to_string(),
        Err(err) => err.to_string(),
    };
    let mut state = shared.state();
    if state.generation != generation {
        return;
    }
    state.acquisition.take();
    schedule_reconnect(&shared, &mut state, generation, error);
}

fn handle_event<P: Protocol>(
    shared: &Arc<Shared<P>>,
    generation: u64,
    epoch: u64,
    event: AcquireEvent<P::Payload>,
) {
    let source_id = shared.protocol.source_id();
    match event {
        AcquireEvent::Payload {
            payload,
            received_at,
        } => {
            historian_telemetry::record_payload();
            let readings = shared.protocol.process_data(payload, received_at);
            if readings
                .iter()
                .any(|reading| reading.metadata.contains_key("parseError"))
            {
                historian_telemetry::record_parse_error();
            }
            let count = readings.len() as u64;
            {
                let mut state = shared.state();
                if state.generation != generation {
                    return;
                }
                state.last_activity = Some(received_at);
                state.readings_produced += count;
            }
            historian_telemetry::record_readings_produced(count);
            shared.sender.send(epoch, readings);
        }
        AcquireEvent::Error(error) => {
            warn!(target: "historian.protocol", source_id, kind = %P::KIND, error = %error, "acquisition_error");
            let mut state = shared.state();
            if state.generation == generation {
                state.last_error = Some(error);
            }
        }
    }
}
