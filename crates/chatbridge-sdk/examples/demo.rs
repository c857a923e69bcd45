//! 桥接层演示
//!
//! 用内存 SDK 走一遍宿主的完整调用流程：通过 method channel 初始化、拉频道、
//! 发消息、读最后一条，同时打印收到的事件。

use std::sync::Arc;
use std::time::Duration;

use chatbridge_sdk::logging::init_tracing;
use chatbridge_sdk::{
    BridgeConfig, BridgeGateway, InMemoryBackend, MethodChannelClient, SessionManager,
};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::builder().debug_mode(false).build();
    init_tracing(config.debug_mode);

    println!("\n🚀 ChatBridge 演示\n");
    println!("====================================\n");

    let backend = InMemoryBackend::new().with_user("T1", "alice");
    backend.seed_channel("CH1", "General", &["alice", "bob"]).await;

    let session = Arc::new(SessionManager::new(config, Arc::new(backend.clone())));
    let client = MethodChannelClient::connect(BridgeGateway::new(session));

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("📡 事件 {} {}", event.name, event.payload);
        }
    });

    println!("🔌 初始化客户端...");
    let response = client
        .invoke("initialize", json!({ "accessToken": "T1" }))
        .await?;
    println!("   {:?}\n", response);

    let channels = client.invoke("listChannels", Value::Null).await?;
    println!("📋 频道列表: {:?}\n", channels);

    client
        .invoke("sendMessage", json!({ "channelId": "CH1", "body": "hi" }))
        .await?;
    backend.post_message("CH1", "bob", "hello alice").await?;

    let last = client
        .invoke("fetchLastMessage", json!({ "channelId": "CH1" }))
        .await?;
    println!("💬 最后一条: {:?}\n", last);

    let missing = client
        .invoke("sendMessage", json!({ "channelId": "CH404", "body": "?" }))
        .await?;
    println!("❌ 未知频道: {:?}\n", missing);

    let version = client.invoke("getSdkVersion", Value::Null).await?;
    println!("ℹ️  版本: {:?}", version);

    // 等事件打印完
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.invoke("shutdown", Value::Null).await?;
    client.close();

    println!("\n✅ 演示完成");
    Ok(())
}
