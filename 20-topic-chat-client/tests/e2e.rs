mod common;

use std::{collections::HashSet, path::Path, process::Stdio};

use anyhow::{Context, Result, anyhow};
use common::{StubBackend, WAIT};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

#[tokio::test]
async fn cli_session_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("topic_chat_client");
    let backend = StubBackend::start().await?;

    let mut bob = spawn_client(&binary, &backend).await?;
    backend.wait_for_subscription("general").await?;

    // Publishing is refused locally until the operator logs in.
    bob.send_line("post general hello").await?;
    assert_eq!(
        bob.read_line("waiting for login warning").await?,
        "!!! you must login before publishing"
    );
    assert!(backend.requests().is_empty());

    bob.send_line("login bob").await?;
    assert_eq!(bob.read_line("waiting for login").await?, "*** logged in as bob");
    assert_eq!(
        bob.read_line("waiting for personal topic").await?,
        "*** direct messages will arrive on bob"
    );

    // A direct message arrives on the personal topic without any command being issued.
    backend.wait_for_subscription("bob").await?;
    backend.publish("bob", r#"{"type":"p2p","src":"alice","content":"psst"}"#);
    assert_eq!(
        bob.read_line("waiting for direct message").await?,
        "[private] alice: psst"
    );

    // The broadcast and the reply race each other; both must show up intact.
    bob.send_line("post general hello everyone").await?;
    let mut seen = HashSet::new();
    seen.insert(bob.read_line("waiting for publish output").await?);
    seen.insert(bob.read_line("waiting for publish output").await?);
    assert_eq!(
        seen,
        HashSet::from([
            "*** message delivered to general".to_string(),
            "[general] bob: hello everyone".to_string(),
        ])
    );

    bob.send_line("quit").await?;
    assert_eq!(bob.read_line("waiting for goodbye").await?, "*** leaving chat");
    ensure_success(&mut bob.child).await?;

    Ok(())
}

#[tokio::test]
async fn closing_stdin_ends_the_session() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("topic_chat_client");
    let backend = StubBackend::start().await?;

    let ClientProcess {
        mut child, stdin, ..
    } = spawn_client(&binary, &backend).await?;
    drop(stdin);

    ensure_success(&mut child).await
}

#[tokio::test]
async fn unreachable_backend_is_an_error_exit() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("topic_chat_client");
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let closed_addr = listener.local_addr()?;
    drop(listener);

    let status = Command::new(binary)
        .arg("--command-addr")
        .arg(closed_addr.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    assert!(!status.success());
    Ok(())
}

struct ClientProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ClientProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self, description: &str) -> Result<String> {
        let mut line = String::new();
        let bytes = timeout(WAIT, self.stdout.read_line(&mut line))
            .await
            .map_err(|_| anyhow!("{description}: timed out"))??;
        if bytes == 0 {
            return Err(anyhow!("{description}: stream closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

async fn spawn_client(binary: &Path, backend: &StubBackend) -> Result<ClientProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("--command-addr")
        .arg(backend.command_addr.to_string())
        .arg("--subscribe-addr")
        .arg(backend.subscribe_addr.to_string())
        .env("RUST_LOG", "warn")
        .env("RUST_LOG_STYLE", "never")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn client")?;
    let stdin = child.stdin.take().context("client stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("client stdout missing after spawn")?;

    let mut process = ClientProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    };

    let banner = process.read_line("waiting for banner").await?;
    if banner != "*** listening to general; type 'help' for commands" {
        return Err(anyhow!("unexpected banner '{banner}'"));
    }

    Ok(process)
}

async fn ensure_success(child: &mut Child) -> Result<()> {
    let status = timeout(WAIT, child.wait())
        .await
        .context("client did not exit")?
        .context("failed to await client process")?;
    if !status.success() {
        return Err(anyhow!("client exited with status {status}"));
    }
    Ok(())
}
