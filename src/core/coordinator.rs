use crate::domain::model::{ApiError, ModuleName};
use crate::domain::ports::{AlertsService, ShowableRef};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};

/// 協調器終止時回報的錯誤，API 錯誤原樣傳遞
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("screen '{screen}' could not be created")]
    ScreenUnavailable { screen: &'static str },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("no screen is left to report events")]
    Detached,
}

/// 終止結果的回呼，型別上就只能被呼叫一次
pub type FlowCallback<O> = Box<dyn FnOnce(Result<O, FlowError>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Idle,
    Running,
    AwaitingQuitConfirmation,
    Finished,
}

/// 子畫面回報事件用的通道，取代指回協調器的參考
///
/// 可以從背景執行緒送出；協調器結束或被釋放後送出的事件只會記錄警告。
pub struct EventSink<E> {
    module: ModuleName,
    sender: UnboundedSender<E>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            module: self.module,
            sender: self.sender.clone(),
        }
    }
}

impl<E: Send + 'static> EventSink<E> {
    pub fn send(&self, event: E) {
        if self.sender.send(event).is_err() {
            tracing::warn!(
                "⚠️ {} coordinator is gone, dropping late event",
                self.module
            );
        }
    }

    pub fn module(&self) -> ModuleName {
        self.module
    }
}

/// 模組事件必須能表示離開要求與離開確認的結果
pub trait FlowEvent: Send + 'static {
    fn quit_decision(confirmed: bool) -> Self;

    fn as_quit_decision(&self) -> Option<bool>;

    fn is_quit_request(&self) -> bool;
}

/// 協調器共用的狀態機骨架：單一回呼槽、事件佇列、離開確認閘門
pub struct FlowDriver<E, O> {
    module: ModuleName,
    /// 非同步等待事件前會放掉，之後只剩子畫面持有傳送端
    sender: Option<UnboundedSender<E>>,
    weak_sender: WeakUnboundedSender<E>,
    receiver: UnboundedReceiver<E>,
    callback: Option<FlowCallback<O>>,
    phase: FlowPhase,
    deferred: VecDeque<E>,
}

impl<E: FlowEvent, O> FlowDriver<E, O> {
    pub fn new(module: ModuleName) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            module,
            weak_sender: sender.downgrade(),
            sender: Some(sender),
            receiver,
            callback: None,
            phase: FlowPhase::Idle,
            deferred: VecDeque::new(),
        }
    }

    pub fn module(&self) -> ModuleName {
        self.module
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    pub fn sink(&self) -> EventSink<E> {
        let sender = self
            .sender
            .clone()
            .or_else(|| self.weak_sender.upgrade())
            .unwrap_or_else(|| {
                tracing::warn!(
                    "⚠️ {} coordinator has no live screens, new sink is disconnected",
                    self.module
                );
                mpsc::unbounded_channel().0
            });
        EventSink {
            module: self.module,
            sender,
        }
    }

    /// 記下回呼並進入 Running；同一個實例第二次呼叫會被拒絕
    pub fn begin(&mut self, callback: FlowCallback<O>) -> bool {
        if self.phase != FlowPhase::Idle {
            tracing::error!(
                "❌ {} coordinator was started twice; ignoring the second start",
                self.module
            );
            return false;
        }
        self.callback = Some(callback);
        self.phase = FlowPhase::Running;
        true
    }

    /// 交付終止結果，之後的事件一律丟棄
    pub fn finish(&mut self, result: Result<O, FlowError>) {
        let Some(callback) = self.callback.take() else {
            tracing::warn!(
                "⚠️ {} coordinator already delivered its result",
                self.module
            );
            return;
        };
        self.phase = FlowPhase::Finished;
        self.deferred.clear();
        callback(result);
    }

    pub fn request_quit(&mut self, alerts: &dyn AlertsService) {
        if self.phase != FlowPhase::Running {
            tracing::debug!(
                "{} quit requested while {:?}, ignoring",
                self.module,
                self.phase
            );
            return;
        }
        self.phase = FlowPhase::AwaitingQuitConfirmation;
        let sink = self.sink();
        alerts.present_quit_alert(Box::new(move |confirmed| {
            sink.send(E::quit_decision(confirmed));
        }));
    }

    /// 依目前階段過濾事件，只有需要協調器處理的才會回傳
    ///
    /// 等待離開確認時，重複的離開要求直接丟棄，其他事件先暫存，
    /// 取消離開後再依序處理；確認離開時以 `abort()` 的輸出結束流程。
    pub fn admit(&mut self, event: E, abort: impl FnOnce() -> O) -> Option<E> {
        match self.phase {
            FlowPhase::Idle => {
                tracing::warn!("⚠️ {} coordinator got an event before start", self.module);
                None
            }
            FlowPhase::Finished => {
                tracing::warn!(
                    "⚠️ {} coordinator already finished, dropping late event",
                    self.module
                );
                None
            }
            FlowPhase::AwaitingQuitConfirmation => {
                match event.as_quit_decision() {
                    Some(true) => {
                        tracing::info!("🚪 {} flow aborted by the user", self.module);
                        self.finish(Ok(abort()));
                    }
                    Some(false) => {
                        tracing::debug!("{} quit declined", self.module);
                        self.phase = FlowPhase::Running;
                    }
                    None if event.is_quit_request() => {
                        tracing::debug!("{} quit prompt already open", self.module);
                    }
                    None => self.deferred.push_back(event),
                }
                None
            }
            FlowPhase::Running => {
                if event.as_quit_decision().is_some() {
                    tracing::warn!("⚠️ {} got a quit decision without a prompt", self.module);
                    return None;
                }
                Some(event)
            }
        }
    }

    pub fn try_next_event(&mut self) -> Option<E> {
        if self.phase == FlowPhase::Finished {
            while self.receiver.try_recv().is_ok() {
                tracing::warn!(
                    "⚠️ {} coordinator already finished, dropping late event",
                    self.module
                );
            }
            return None;
        }
        if self.phase == FlowPhase::Running {
            if let Some(event) = self.deferred.pop_front() {
                return Some(event);
            }
        }
        self.receiver.try_recv().ok()
    }

    /// 所有子畫面都釋放傳送端後回傳 `None`
    pub async fn next_event(&mut self) -> Option<E> {
        if self.phase == FlowPhase::Running {
            if let Some(event) = self.deferred.pop_front() {
                return Some(event);
            }
        }
        self.sender = None;
        self.receiver.recv().await
    }
}

/// 單一模組流程的狀態機協定
///
/// `start` 每個實例只能呼叫一次：同步回傳第一個要顯示的畫面（或 `None`），
/// 終止結果則透過回呼剛好交付一次。事件由子畫面經 [`EventSink`] 送入，
/// 在 UI 執行緒上以 [`FlowCoordinator::dispatch_pending`] 處理。
pub trait FlowCoordinator {
    type Input;
    type Output;
    type Event: FlowEvent;

    fn start(
        &mut self,
        input: Self::Input,
        callback: FlowCallback<Self::Output>,
    ) -> Option<ShowableRef>;

    fn handle_event(&mut self, event: Self::Event);

    fn flow_driver(&mut self) -> &mut FlowDriver<Self::Event, Self::Output>;

    fn phase(&self) -> FlowPhase;

    fn events(&mut self) -> EventSink<Self::Event> {
        self.flow_driver().sink()
    }

    fn is_finished(&self) -> bool {
        self.phase() == FlowPhase::Finished
    }

    /// 處理目前佇列中的所有事件，回傳處理數量
    fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.flow_driver().try_next_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }
}

/// 持續等待並處理事件，直到協調器交付結果
///
/// 沒有任何子畫面能再送出事件時，以 [`FlowError::Detached`] 結束流程。
pub async fn run_until_finished<C>(coordinator: &mut C)
where
    C: FlowCoordinator + ?Sized,
{
    while !coordinator.is_finished() {
        match coordinator.flow_driver().next_event().await {
            Some(event) => coordinator.handle_event(event),
            None => {
                let driver = coordinator.flow_driver();
                tracing::error!("❌ {} flow has no screens left", driver.module());
                driver.finish(Err(FlowError::Detached));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, PartialEq)]
    enum ToyEvent {
        Advance,
        Quit,
        QuitDecision(bool),
    }

    impl FlowEvent for ToyEvent {
        fn quit_decision(confirmed: bool) -> Self {
            ToyEvent::QuitDecision(confirmed)
        }

        fn as_quit_decision(&self) -> Option<bool> {
            match self {
                ToyEvent::QuitDecision(confirmed) => Some(*confirmed),
                _ => None,
            }
        }

        fn is_quit_request(&self) -> bool {
            matches!(self, ToyEvent::Quit)
        }
    }

    #[derive(Debug, PartialEq)]
    enum ToyOutput {
        Done,
        Abort,
    }

    #[derive(Default)]
    struct ScriptedAlerts {
        pending: Mutex<Vec<Box<dyn FnOnce(bool) + Send>>>,
    }

    impl ScriptedAlerts {
        fn shown(&self) -> usize {
            self.pending.lock().unwrap().len()
        }

        fn answer(&self, confirmed: bool) {
            let callback = self.pending.lock().unwrap().pop().expect("no alert shown");
            callback(confirmed);
        }
    }

    impl AlertsService for ScriptedAlerts {
        fn present_quit_alert(&self, callback: Box<dyn FnOnce(bool) + Send>) {
            self.pending.lock().unwrap().push(callback);
        }
    }

    struct ToyCoordinator {
        driver: FlowDriver<ToyEvent, ToyOutput>,
        alerts: Arc<ScriptedAlerts>,
        advanced: usize,
    }

    impl FlowCoordinator for ToyCoordinator {
        type Input = ();
        type Output = ToyOutput;
        type Event = ToyEvent;

        fn start(&mut self, _input: (), callback: FlowCallback<ToyOutput>) -> Option<ShowableRef> {
            self.driver.begin(callback);
            None
        }

        fn handle_event(&mut self, event: ToyEvent) {
            let Some(event) = self.driver.admit(event, || ToyOutput::Abort) else {
                return;
            };
            match event {
                ToyEvent::Advance => {
                    self.advanced += 1;
                    if self.advanced == 2 {
                        self.driver.finish(Ok(ToyOutput::Done));
                    }
                }
                ToyEvent::Quit => self.driver.request_quit(self.alerts.as_ref()),
                ToyEvent::QuitDecision(_) => {}
            }
        }

        fn flow_driver(&mut self) -> &mut FlowDriver<ToyEvent, ToyOutput> {
            &mut self.driver
        }

        fn phase(&self) -> FlowPhase {
            self.driver.phase()
        }
    }

    type Results = Rc<RefCell<Vec<Result<ToyOutput, FlowError>>>>;

    fn toy_with_results() -> (ToyCoordinator, Results) {
        let mut coordinator = ToyCoordinator {
            driver: FlowDriver::new(ModuleName::Core),
            alerts: Arc::new(ScriptedAlerts::default()),
            advanced: 0,
        };
        let results: Results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        coordinator.start((), Box::new(move |result| sink.borrow_mut().push(result)));
        (coordinator, results)
    }

    fn toy() -> (ToyCoordinator, Arc<ScriptedAlerts>, Rc<RefCell<Vec<ToyOutput>>>) {
        let alerts = Arc::new(ScriptedAlerts::default());
        let mut coordinator = ToyCoordinator {
            driver: FlowDriver::new(ModuleName::Core),
            alerts: alerts.clone(),
            advanced: 0,
        };
        let outputs = Rc::new(RefCell::new(Vec::new()));
        let sink = outputs.clone();
        coordinator.start(
            (),
            Box::new(move |result| sink.borrow_mut().push(result.unwrap())),
        );
        (coordinator, alerts, outputs)
    }

    #[test]
    fn test_result_delivered_once_and_late_events_dropped() {
        let (mut coordinator, _alerts, outputs) = toy();
        let events = coordinator.events();

        events.send(ToyEvent::Advance);
        events.send(ToyEvent::Advance);
        events.send(ToyEvent::Advance);
        coordinator.dispatch_pending();

        assert_eq!(*outputs.borrow(), vec![ToyOutput::Done]);
        assert!(coordinator.is_finished());

        events.send(ToyEvent::Advance);
        assert_eq!(coordinator.dispatch_pending(), 0);
        assert_eq!(outputs.borrow().len(), 1);
    }

    #[test]
    fn test_second_start_is_ignored() {
        let (mut coordinator, _alerts, outputs) = toy();
        let second = Rc::new(RefCell::new(0));
        let counter = second.clone();
        coordinator.start((), Box::new(move |_| *counter.borrow_mut() += 1));

        coordinator.events().send(ToyEvent::Advance);
        coordinator.events().send(ToyEvent::Advance);
        coordinator.dispatch_pending();

        assert_eq!(outputs.borrow().len(), 1);
        assert_eq!(*second.borrow(), 0);
    }

    #[test]
    fn test_events_deferred_while_quit_prompt_is_open() {
        let (mut coordinator, alerts, outputs) = toy();
        let events = coordinator.events();

        events.send(ToyEvent::Quit);
        coordinator.dispatch_pending();
        assert_eq!(coordinator.phase(), FlowPhase::AwaitingQuitConfirmation);

        events.send(ToyEvent::Advance);
        events.send(ToyEvent::Advance);
        coordinator.dispatch_pending();
        assert_eq!(coordinator.advanced, 0);
        assert!(outputs.borrow().is_empty());

        alerts.answer(false);
        coordinator.dispatch_pending();
        assert_eq!(coordinator.advanced, 2);
        assert_eq!(*outputs.borrow(), vec![ToyOutput::Done]);
    }

    #[test]
    fn test_repeated_quit_while_prompt_is_open_is_dropped() {
        let (mut coordinator, alerts, outputs) = toy();
        let events = coordinator.events();

        events.send(ToyEvent::Quit);
        events.send(ToyEvent::Quit);
        coordinator.dispatch_pending();
        assert_eq!(alerts.shown(), 1);

        alerts.answer(false);
        coordinator.dispatch_pending();

        assert_eq!(alerts.shown(), 0);
        assert_eq!(coordinator.phase(), FlowPhase::Running);
        assert!(outputs.borrow().is_empty());
    }

    #[test]
    fn test_confirmed_quit_aborts() {
        let (mut coordinator, alerts, outputs) = toy();
        coordinator.events().send(ToyEvent::Quit);
        coordinator.dispatch_pending();

        alerts.answer(true);
        coordinator.dispatch_pending();

        assert_eq!(*outputs.borrow(), vec![ToyOutput::Abort]);
    }

    #[test]
    fn test_sink_outliving_coordinator_is_harmless() {
        let (coordinator, _alerts, _outputs) = toy();
        let events = {
            let mut coordinator = coordinator;
            coordinator.events()
        };
        events.send(ToyEvent::Advance);
    }

    #[tokio::test]
    async fn test_run_until_finished_with_background_events() {
        let (mut coordinator, _alerts, outputs) = toy();
        let events = coordinator.events();

        let producer = std::thread::spawn(move || {
            events.send(ToyEvent::Advance);
            events.send(ToyEvent::Advance);
        });

        run_until_finished(&mut coordinator).await;
        producer.join().unwrap();

        assert_eq!(*outputs.borrow(), vec![ToyOutput::Done]);
    }

    #[tokio::test]
    async fn test_run_until_finished_ends_when_all_sinks_are_dropped() {
        let (mut coordinator, results) = toy_with_results();
        let events = coordinator.events();
        events.send(ToyEvent::Advance);
        drop(events);

        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            run_until_finished(&mut coordinator),
        )
        .await
        .expect("flow kept waiting without any sink");

        assert_eq!(coordinator.advanced, 1);
        assert_eq!(*results.borrow(), vec![Err(FlowError::Detached)]);
        assert!(coordinator.is_finished());
    }
}
