//! WebSocket 订阅连接
//!
//! 把四路过滤后的事件流（新消息、会话更新、通知、输入状态）多路
//! 复用到单个 WebSocket 连接上，并处理客户端发来的输入状态信号和
//! 心跳。连接断开时所有订阅随流的析构立即释放，不留悬挂的注册。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use application::{TypingSignal, TypingStream};
use domain::{Conversation, Message, Notification};

use crate::state::AppState;

/// 服务端推送的事件帧
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerEvent {
    NewMessage { message: Message },
    ConversationUpdated { conversation: Conversation },
    Typing { signal: TypingSignal },
    Notification { notification: Notification },
    /// 应用层心跳响应
    Pong,
}

/// 客户端发来的事件帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientEvent {
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
    Ping,
}

/// WebSocket 写操作命令
///
/// 统一经由 mpsc channel 解耦对 sender 的访问。
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

pub struct WebSocketConnection {
    state: AppState,
    user_id: Uuid,
    typing_stream: Option<TypingStream>,
}

impl WebSocketConnection {
    pub fn new(state: AppState, user_id: Uuid, typing_stream: Option<TypingStream>) -> Self {
        Self {
            state,
            user_id,
            typing_stream,
        }
    }

    /// 运行连接主循环，直到任意一侧断开
    pub async fn run(self, socket: WebSocket) {
        let user_id = self.user_id;
        tracing::info!(user_id = %user_id, "WebSocket 连接已建立");

        let mut message_stream = self.state.messaging_service.subscribe_messages(user_id);
        let mut conversation_stream =
            self.state.messaging_service.subscribe_conversations(user_id);
        let mut notification_stream =
            self.state.messaging_service.subscribe_notifications(user_id);
        let mut typing_stream = self.typing_stream;

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：处理写命令，并把各路事件流编码成帧直接写出，
        // 避免经由命令通道给自己回投（满载时会自锁）
        let send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    command = cmd_rx.recv() => {
                        let Some(command) = command else { break };
                        match command {
                            WsCommand::SendText(text) => WsMessage::Text(text.into()),
                            WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                        }
                    }
                    message = message_stream.recv() => {
                        let Some(message) = message else { break };
                        match encode(ServerEvent::NewMessage { message }) {
                            Some(frame) => frame,
                            None => continue,
                        }
                    }
                    conversation = conversation_stream.recv() => {
                        let Some(conversation) = conversation else { break };
                        match encode(ServerEvent::ConversationUpdated { conversation }) {
                            Some(frame) => frame,
                            None => continue,
                        }
                    }
                    notification = notification_stream.recv() => {
                        let Some(notification) = notification else { break };
                        match encode(ServerEvent::Notification { notification }) {
                            Some(frame) => frame,
                            None => continue,
                        }
                    }
                    signal = next_typing(&mut typing_stream) => {
                        let Some(signal) = signal else { break };
                        match encode(ServerEvent::Typing { signal }) {
                            Some(frame) => frame,
                            None => continue,
                        }
                    }
                };

                if sender.send(frame).await.is_err() {
                    break;
                }
            }
        });

        // 接收任务：处理客户端帧（输入状态、心跳、关闭）
        let recv_task = {
            let state = self.state.clone();
            tokio::spawn(async move {
                while let Some(Ok(frame)) = incoming.next().await {
                    match frame {
                        WsMessage::Close(_) => break,
                        WsMessage::Ping(data) => {
                            if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Pong(_) => {}
                        WsMessage::Text(text) => {
                            handle_client_frame(&state, user_id, text.as_str(), &cmd_tx).await;
                        }
                        WsMessage::Binary(_) => {
                            tracing::debug!("收到二进制帧（不支持）");
                        }
                    }
                }
            })
        };

        // 任意一个任务结束即视为连接断开
        tokio::select! {
            _ = send_task => {}
            _ = recv_task => {}
        }

        // 各事件流随任务结束被析构，订阅注册立即释放
        tracing::info!(user_id = %user_id, "WebSocket 连接已断开");
    }
}

/// 把事件编码成文本帧；序列化失败记日志并丢弃该事件
fn encode(event: ServerEvent) -> Option<WsMessage> {
    match serde_json::to_string(&event) {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(err) => {
            tracing::warn!(error = %err, "事件帧序列化失败");
            None
        }
    }
}

/// 还没有订阅输入状态时永远挂起，让select分支不被选中
async fn next_typing(stream: &mut Option<TypingStream>) -> Option<TypingSignal> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

/// 处理客户端文本帧
async fn handle_client_frame(
    state: &AppState,
    user_id: Uuid,
    text: &str,
    cmd_tx: &mpsc::Sender<WsCommand>,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(error = %err, "无法解析的客户端帧");
            return;
        }
    };

    match event {
        ClientEvent::Typing {
            conversation_id,
            is_typing,
        } => {
            if let Err(err) = state
                .messaging_service
                .send_typing_indicator(conversation_id, user_id, is_typing)
                .await
            {
                tracing::warn!(
                    user_id = %user_id,
                    conversation_id = %conversation_id,
                    error = %err,
                    "输入状态信号被拒绝"
                );
            }
        }
        ClientEvent::Ping => {
            if let Ok(json) = serde_json::to_string(&ServerEvent::Pong) {
                let _ = cmd_tx.send(WsCommand::SendText(json)).await;
            }
        }
    }
}
