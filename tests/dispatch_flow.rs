//! End-to-end flows through the receive loop.

mod common;

use async_trait::async_trait;
use common::{TestBot, WEATHER_ID, register_json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tenyks::envelope::PING;
use tenyks::error::HandlerResult;
use tenyks::config::DispatchConfig;
use tenyks::heartbeat::send_heartbeat;
use tenyks::transport::{ConnectionMap, LineTransport, Transport, run_receive_loop};
use tenyks::{CommandRegistry, Dispatcher, Envelope, Handler, HandlerContext, ServiceRegistry};
use tokio_util::sync::CancellationToken;
use tokio::sync::Notify;

/// Replies to `!weather` on the envelope's own connection.
struct WeatherReply;

#[async_trait]
impl Handler for WeatherReply {
    fn name(&self) -> &str {
        "weather-reply"
    }

    async fn handle(&self, ctx: HandlerContext, envelope: Arc<Envelope>) -> HandlerResult {
        let reply = Envelope::privmsg(
            envelope.connection.clone(),
            envelope.target.clone(),
            format!("{}: sunny in {}", envelope.nick, envelope.payload),
        );
        if let Some(conn) = ctx.connections.connection_by_name(&reply.connection) {
            let _ = conn.send_line(reply.outbound_line()).await;
        }
        Ok(())
    }
}

struct Counter {
    calls: Arc<AtomicUsize>,
    done: Arc<Notify>,
}

#[async_trait]
impl Handler for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn handle(&self, _ctx: HandlerContext, _envelope: Arc<Envelope>) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.done.notify_one();
        Ok(())
    }
}

async fn settle(bot: &TestBot) {
    // Let the receive loop pick up everything queued so far.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    bot.dispatcher.wait_idle().await;
}

#[tokio::test]
async fn privmsg_reaches_the_named_connection() {
    let mut bot = TestBot::spawn(CommandRegistry::new());
    bot.send(r##"{"command":"PRIVMSG","connection":"freenode","target":"#test","payload":"hi"}"##)
        .await;
    assert_eq!(bot.next_line().await.as_deref(), Some("PRIVMSG #test :hi"));
    bot.stop().await;
}

#[tokio::test]
async fn privmsg_to_bogus_connection_sends_nothing() {
    let mut bot = TestBot::spawn(CommandRegistry::new());
    bot.send(r##"{"command":"PRIVMSG","connection":"bogus","target":"#test","payload":"hi"}"##)
        .await;
    settle(&bot).await;
    assert!(bot.freenode.try_recv().is_err());
    bot.stop().await;
}

#[tokio::test]
async fn handler_replies_through_connection() {
    let commands = CommandRegistry::new();
    commands.register("!weather", Arc::new(WeatherReply));
    let mut bot = TestBot::spawn(commands);

    bot.send(
        r##"{"command":"!weather","connection":"freenode","target":"#test","nick":"kyle","payload":"97217","fromchannel":true}"##,
    )
    .await;
    assert_eq!(
        bot.next_line().await.as_deref(),
        Some("PRIVMSG #test :kyle: sunny in 97217")
    );
    bot.stop().await;
}

#[tokio::test]
async fn garbage_between_envelopes_is_skipped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(Notify::new());
    let commands = CommandRegistry::new();
    commands.register(
        "!count",
        Arc::new(Counter {
            calls: Arc::clone(&calls),
            done: Arc::clone(&done),
        }),
    );
    let bot = TestBot::spawn(commands);

    bot.send("this is not json").await;
    bot.send(r#"{"command":"!count"}"#).await;
    bot.send(vec![0xffu8, 0x00, 0x13]).await;

    tokio::time::timeout(Duration::from_secs(2), done.notified())
        .await
        .expect("handler ran");
    settle(&bot).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    bot.stop().await;
}

#[tokio::test]
async fn weather_registers_once_and_answers_heartbeat() {
    let mut bot = TestBot::spawn(CommandRegistry::new());
    bot.send(register_json("weather")).await;
    bot.send(register_json("weather")).await;
    settle(&bot).await;

    assert_eq!(bot.services.len(), 1);
    let weather = bot.services.lookup("weather").unwrap();
    assert!(weather.online);
    assert_eq!(weather.responded_count, 0);
    assert_eq!(weather.id.to_string(), WEATHER_ID);

    let pinged = send_heartbeat(
        &bot.services,
        bot.transport.as_ref(),
        "tenyks.services.broadcast_to",
    )
    .await;
    assert_eq!(pinged, 1);

    let (_, raw) = bot.broker.published.recv().await.unwrap();
    assert_eq!(Envelope::decode(&raw).unwrap().command, PING);

    bot.send(format!(
        r#"{{"command":"PONG","meta":{{"name":"weather","UUID":"{WEATHER_ID}"}}}}"#
    ))
    .await;
    settle(&bot).await;

    let weather = bot.services.lookup("weather").unwrap();
    assert_eq!(weather.responded_count, 1);
    assert!(weather.last_ping.is_some());
    assert!(weather.last_pong.is_some());
    bot.stop().await;
}

#[tokio::test]
async fn concurrent_registrations_are_all_kept() {
    let bot = TestBot::spawn(CommandRegistry::new());
    let mut tasks = Vec::new();
    for i in 0..32 {
        let dispatcher = Arc::clone(&bot.dispatcher);
        tasks.push(tokio::spawn(async move {
            dispatcher
                .dispatch(register_json(&format!("service-{i}")).as_bytes())
                .await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(bot.services.len(), 32);
    assert!(bot.services.online().iter().all(|s| s.online));
    bot.stop().await;
}

#[tokio::test]
async fn bad_input_lines_do_not_end_the_stream() {
    let mut input = b"\xff\xfe\n".to_vec();
    input.extend_from_slice(register_json("weather").as_bytes());
    input.push(b'\n');
    input.extend(std::iter::repeat_n(b'x', 70_000));
    input.push(b'\n');
    input.extend_from_slice(register_json("karma").as_bytes());
    input.push(b'\n');

    let services = Arc::new(ServiceRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        &DispatchConfig::default(),
        Arc::new(CommandRegistry::new()),
        Arc::clone(&services),
        Arc::new(ConnectionMap::new()),
    ));
    let transport: Arc<dyn Transport> = Arc::new(LineTransport::from_parts(
        std::io::Cursor::new(input),
        tokio::io::sink(),
    ));

    // Returns at end of input, not at the first bad line.
    tokio::time::timeout(
        Duration::from_secs(2),
        run_receive_loop(Arc::clone(&dispatcher), transport, CancellationToken::new()),
    )
    .await
    .expect("receive loop reached end of input");

    assert_eq!(services.names(), ["karma", "weather"]);
    dispatcher.shutdown().await;
}
