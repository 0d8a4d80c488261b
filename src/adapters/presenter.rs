use crate::domain::ports::{AlertsService, Presenter, ShowableRef};

/// 沒有畫面時使用：只把導航動作寫進日誌
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn push(&self, showable: ShowableRef, _animated: bool) {
        tracing::info!("🖼️ push {}", showable.name());
    }

    fn present(&self, showable: ShowableRef, _animated: bool) {
        tracing::info!("🖼️ present {}", showable.name());
    }

    fn pop(&self, _animated: bool) {
        tracing::info!("🖼️ pop");
    }

    fn dismiss(&self, _animated: bool) {
        tracing::info!("🖼️ dismiss");
    }
}

/// 離開確認一律回覆固定答案
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswerAlerts {
    confirm: bool,
}

impl FixedAnswerAlerts {
    pub fn new(confirm: bool) -> Self {
        Self { confirm }
    }
}

impl AlertsService for FixedAnswerAlerts {
    fn present_quit_alert(&self, callback: Box<dyn FnOnce(bool) + Send>) {
        tracing::debug!("Quit alert answered with {}", self.confirm);
        callback(self.confirm);
    }
}
