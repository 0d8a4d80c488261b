use crate::domain::model::IdentificationMethod;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 可以交給 [`Presenter`] 顯示的畫面單元，實際繪製不在本 crate 範圍內
pub trait Showable: Send + Sync {
    /// Stable name of the screen, used for logging and by test doubles.
    fn name(&self) -> &str;
}

pub type ShowableRef = Arc<dyn Showable>;

/// 導航堆疊，協調器只透過它推入、彈出或呈現畫面
pub trait Presenter: Send + Sync {
    fn push(&self, showable: ShowableRef, animated: bool);
    fn present(&self, showable: ShowableRef, animated: bool);
    fn pop(&self, animated: bool);
    fn dismiss(&self, animated: bool);
}

/// 所有模組共用的離開確認對話框
///
/// `true` 表示使用者確認離開，`false` 表示留在目前畫面。
pub trait AlertsService: Send + Sync {
    fn present_quit_alert(&self, callback: Box<dyn FnOnce(bool) + Send>);
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn fetch_identification_method(&self) -> Result<IdentificationMethod>;
}
