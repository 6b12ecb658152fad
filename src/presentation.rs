/// 显示端接口 (Presentation sink)
///
/// 原始帧在控制线程同步送达; 标注帧与日志从推理线程经消息通道异步送达,
/// 由渲染主循环在自己的线程里取出后再改动界面状态。
use crate::detection::Frame;
use crossbeam_channel::{Receiver, Sender, TrySendError};

/// 显示端。日志接口必须能同时被控制线程与推理线程调用。
pub trait Presenter: Send + Sync {
    /// 显示原始帧 (控制线程, 采集节拍上同步调用)
    fn show_raw(&self, frame: &Frame);

    /// 显示标注帧 (推理线程调用, 实现必须只投递消息)
    fn show_annotated(&self, frame: Frame);

    /// 追加一行日志
    fn log(&self, line: &str);

    /// 需要用户确认的错误提示 (视频源打开失败)
    fn alert(&self, title: &str, message: &str) {
        self.log(&format!("{}: {}", title, message));
    }

    /// 清空两个画面 (流水线停止时)
    fn clear(&self) {}
}

/// 渲染线程收到的消息
#[derive(Clone, Debug)]
pub enum UiEvent {
    Raw(Frame),
    Annotated(Frame),
    Log(String),
    Alert { title: String, message: String },
    Clear,
}

/// 基于消息通道的显示端: 发送侧给流水线, 接收侧留给渲染主循环
///
/// 画面帧走有界通道, 满了直接丢 (渲染端只画最新一帧);
/// 日志与控制消息走无界通道, 不丢。
#[derive(Clone)]
pub struct ChannelPresenter {
    frame_tx: Sender<UiEvent>,
    event_tx: Sender<UiEvent>,
}

/// 渲染主循环持有的接收端
pub struct UiReceiver {
    frame_rx: Receiver<UiEvent>,
    event_rx: Receiver<UiEvent>,
}

impl ChannelPresenter {
    pub fn new(frame_capacity: usize) -> (Self, UiReceiver) {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(frame_capacity.max(1));
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        (
            Self { frame_tx, event_tx },
            UiReceiver { frame_rx, event_rx },
        )
    }

    fn post_frame(&self, event: UiEvent) {
        match self.frame_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::trace!("渲染通道已满, 丢弃一帧"),
            Err(TrySendError::Disconnected(_)) => log::debug!("渲染端已退出"),
        }
    }
}

impl Presenter for ChannelPresenter {
    fn show_raw(&self, frame: &Frame) {
        self.post_frame(UiEvent::Raw(frame.clone()));
    }

    fn show_annotated(&self, frame: Frame) {
        self.post_frame(UiEvent::Annotated(frame));
    }

    fn log(&self, line: &str) {
        log::info!("{}", line);
        let _ = self.event_tx.send(UiEvent::Log(line.to_string()));
    }

    fn alert(&self, title: &str, message: &str) {
        log::warn!("{}: {}", title, message);
        let _ = self.event_tx.send(UiEvent::Alert {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn clear(&self) {
        let _ = self.event_tx.send(UiEvent::Clear);
    }
}

impl UiReceiver {
    /// 取出当前所有待处理消息
    ///
    /// 画面帧在前, 日志/控制消息在后: 停止时投递的 `Clear` 总是晚于停止前的画面生效。
    pub fn drain(&self) -> Vec<UiEvent> {
        let mut events: Vec<UiEvent> = self.frame_rx.try_iter().collect();
        events.extend(self.event_rx.try_iter());
        events
    }
}

/// 命令行显示端: 只打印日志, 丢弃画面
#[derive(Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn show_raw(&self, _frame: &Frame) {}

    fn show_annotated(&self, _frame: Frame) {}

    fn log(&self, line: &str) {
        println!("{}", line);
    }
}
