#![cfg(unix)]

use std::io::IsTerminal;

use debugger::{
    SessionConfig,
    testing::{FakeAgent, HostClient, fake_helper},
};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use wire::{BreakpointLocation, FrameNode, StackNode, ValueNode};

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}

fn stack(script_index: i32, line: i32) -> Vec<StackNode> {
    vec![StackNode::Frame(FrameNode {
        script_index,
        function_name: "main".to_string(),
        line,
        children: vec![StackNode::Value(ValueNode {
            name: "count".to_string(),
            value: "3".to_string(),
            type_name: "number".to_string(),
            children: vec![],
        })],
    })]
}

#[tokio::test]
async fn attach_stop_inspect_and_disconnect() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("main.lua");
    std::fs::write(&script, "local count = 3\nprint(count)\n")?;

    let agent = FakeAgent::bind().await?;
    let helper = fake_helper(dir.path(), agent.port()?)?;
    let (mut host, session) = HostClient::start(SessionConfig::default());

    let initialize = host.request("initialize", json!({ "adapterID": "emmy" })).await?;
    assert!(initialize.success);

    let attach = host
        .request(
            "attach",
            json!({
                "pid": 4242,
                "helperExecutable": helper,
                "injectionScript": dir.path().join("Emmy.lua"),
                "sourcePaths": [dir.path()],
            }),
        )
        .await?;
    assert!(attach.success, "{attach:?}");

    let mut agent = agent.accept().await?;
    let wire::Message::Initialize(handshake) = agent.recv().await? else {
        eyre::bail!("expected the initialize handshake");
    };
    assert!(handshake.helper_script.ends_with("Emmy.lua"));
    assert!(handshake.capture_stdout);
    agent.send(wire::Message::InitializeAck).await?;
    host.event("initialized").await?;

    let set = host
        .request(
            "setBreakpoints",
            json!({
                "source": { "path": script },
                "breakpoints": [{ "line": 2 }],
            }),
        )
        .await?;
    assert!(set.success);
    let body = set.body.unwrap_or_default();
    assert_eq!(body["breakpoints"][0]["verified"], json!(false));
    assert_eq!(body["breakpoints"][0]["line"], json!(2));

    assert!(host.request("configurationDone", json!({})).await?.success);

    agent
        .send(wire::Message::LoadScript(wire::LoadScript {
            file_name: "main.lua".to_string(),
            source: String::new(),
            index: 7,
        }))
        .await?;
    assert_eq!(
        agent.recv().await?,
        wire::Message::AddBreakpoint(BreakpointLocation {
            script_index: 7,
            line: 2,
        })
    );
    assert_eq!(agent.recv().await?, wire::Message::LoadDone);

    let changed = host.event("breakpoint").await?;
    let changed = changed.body.unwrap_or_default();
    assert_eq!(changed["reason"], json!("changed"));
    assert_eq!(changed["breakpoint"]["verified"], json!(true));

    agent
        .send(wire::Message::Break {
            frames: stack(7, 2),
        })
        .await?;
    let stopped = host.event("stopped").await?;
    let stopped = stopped.body.unwrap_or_default();
    assert_eq!(stopped["reason"], json!("breakpoint"));
    assert_eq!(stopped["threadId"], json!(1));

    let trace = host
        .request("stackTrace", json!({ "threadId": 1 }))
        .await?;
    let trace = trace.body.unwrap_or_default();
    let frame = &trace["stackFrames"][0];
    assert_eq!(frame["name"], json!("main"));
    assert_eq!(frame["line"], json!(2));
    let path = frame["source"]["path"].as_str().unwrap_or_default();
    assert!(path.ends_with("main.lua"), "{path}");

    let frame_id = frame["id"].clone();
    let scopes = host
        .request("scopes", json!({ "frameId": frame_id }))
        .await?;
    let scopes = scopes.body.unwrap_or_default();
    let handle = scopes["scopes"][0]["variablesReference"].clone();
    let variables = host
        .request("variables", json!({ "variablesReference": handle }))
        .await?;
    let variables = variables.body.unwrap_or_default();
    assert_eq!(variables["variables"][0]["name"], json!("count"));
    assert_eq!(variables["variables"][0]["value"], json!("3"));

    let evaluate = host
        .send("evaluate", json!({ "expression": "count * 2", "frameId": frame_id }))
        .await?;
    let wire::Message::EvaluateRequest(request) = agent.recv().await? else {
        eyre::bail!("expected an evaluate request");
    };
    assert_eq!(request.expression, "count * 2");
    assert_eq!(request.stack_level, 0);
    agent
        .send(wire::Message::EvaluateResponse(wire::EvaluateResponse {
            eval_id: request.eval_id,
            result: Ok(StackNode::Value(ValueNode {
                name: "count * 2".to_string(),
                value: "6".to_string(),
                type_name: "number".to_string(),
                children: vec![],
            })),
        }))
        .await?;
    let evaluated = host.response(evaluate).await?;
    assert!(evaluated.success);
    let evaluated = evaluated.body.unwrap_or_default();
    assert_eq!(evaluated["result"], json!("6"));
    assert_eq!(evaluated["variablesReference"], json!(0));

    assert!(host.request("continue", json!({ "threadId": 1 })).await?.success);
    assert_eq!(agent.recv().await?, wire::Message::Continue);

    assert!(host.request("disconnect", json!({})).await?.success);
    agent.closed().await?;
    session.await??;
    Ok(())
}

#[tokio::test]
async fn helper_without_port_terminates_the_session() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let (mut host, session) = HostClient::start(SessionConfig::default());

    let attach = host
        .request(
            "attach",
            json!({
                "pid": 1,
                "helperExecutable": dir.path().join("missing-helper"),
                "injectionScript": dir.path().join("Emmy.lua"),
            }),
        )
        .await?;
    assert!(attach.success);

    let output = host.output("stderr").await?;
    assert!(output.starts_with("failed to attach"), "{output}");
    host.event("terminated").await?;

    let stack = host.request("stackTrace", json!({ "threadId": 1 })).await?;
    assert!(stack.success);

    assert!(host.request("disconnect", json!({})).await?.success);
    session.await??;
    Ok(())
}

#[tokio::test]
async fn agent_hanging_up_terminates_the_session() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let agent = FakeAgent::bind().await?;
    let helper = fake_helper(dir.path(), agent.port()?)?;
    let (mut host, session) = HostClient::start(SessionConfig::default());

    let attach = host
        .request(
            "attach",
            json!({
                "pid": 1,
                "helperExecutable": helper,
                "injectionScript": dir.path().join("Emmy.lua"),
            }),
        )
        .await?;
    assert!(attach.success);

    let mut agent = agent.accept().await?;
    agent.recv().await?;
    agent.send(wire::Message::InitializeAck).await?;
    host.event("initialized").await?;
    drop(agent);

    host.event("terminated").await?;
    let pause = host.request("pause", json!({ "threadId": 1 })).await?;
    assert!(!pause.success);

    drop(host);
    session.await??;
    Ok(())
}

/// Attach through a fake helper and complete the agent handshake.
async fn attached(
    config: SessionConfig,
    dir: &std::path::Path,
) -> eyre::Result<(
    HostClient,
    debugger::testing::AgentConnection,
    tokio::task::JoinHandle<eyre::Result<()>>,
)> {
    let agent = FakeAgent::bind().await?;
    let helper = fake_helper(dir, agent.port()?)?;
    let (mut host, session) = HostClient::start(config);

    let attach = host
        .request(
            "attach",
            json!({
                "pid": 1,
                "helperExecutable": helper,
                "injectionScript": dir.join("Emmy.lua"),
            }),
        )
        .await?;
    assert!(attach.success);

    let mut agent = agent.accept().await?;
    agent.recv().await?;
    agent.send(wire::Message::InitializeAck).await?;
    host.event("initialized").await?;
    Ok((host, agent, session))
}

async fn assert_connection_fails(frame: &[u8], reason: &str) -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = SessionConfig {
        max_frame_size: 1024,
        ..SessionConfig::default()
    };
    let (mut host, mut agent, session) = attached(config, dir.path()).await?;

    agent.send_raw(frame).await?;

    let text = host.output("stderr").await?;
    assert!(text.starts_with("connection to debuggee lost"), "{text}");
    assert!(text.contains(reason), "{text}");
    host.event("terminated").await?;
    agent.closed().await?;

    let pause = host.request("pause", json!({ "threadId": 1 })).await?;
    assert!(!pause.success);

    drop(host);
    session.await??;
    Ok(())
}

#[tokio::test]
async fn oversized_agent_frame_fails_the_connection() -> eyre::Result<()> {
    let mut frame = 4096u32.to_be_bytes().to_vec();
    frame.extend_from_slice(&[0, 0, 0, 1]);
    assert_connection_fails(&frame, "exceeds maximum allowed 1024").await
}

#[tokio::test]
async fn undersized_agent_frame_fails_the_connection() -> eyre::Result<()> {
    let frame = [0, 0, 0, 2, 0, 1];
    assert_connection_fails(&frame, "too small").await
}
