//! End-to-end tests: a real bouncer on a loopback control port, real
//! control clients, and a fake upstream IRC server that records every
//! line it receives.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use switchboard_core::bouncer::Bouncer;
use switchboard_core::config::Config;

const WAIT: Duration = Duration::from_secs(5);

fn start_bouncer() -> SocketAddr {
    let config = Config {
        listen: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..Config::default()
    };
    let bouncer = Bouncer::new(config).expect("failed to bind test bouncer");
    let addr = bouncer.local_addr();
    tokio::spawn(bouncer.run());
    addr
}

/// A fake IRC network: accepts one connection and records its lines.
async fn start_upstream() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    (addr, rx)
}

struct Control {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Control {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(WAIT, TcpStream::connect(addr))
            .await
            .expect("connect timed out")
            .expect("connect failed");
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn send(&mut self, line: &str) {
        self.write
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .expect("write failed");
    }

    async fn recv(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for a reply")
            .expect("control connection errored")
            .expect("control connection closed")
    }

    /// Wait for the bouncer to close our connection.
    async fn recv_eof(&mut self) {
        let eof = timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for close");
        assert!(matches!(eof, Ok(None) | Err(_)), "expected EOF, got {:?}", eof);
    }
}

async fn upstream_line(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an upstream line")
        .expect("upstream recorder gone")
}

#[tokio::test]
async fn connect_join_part_disconnect_cycle() {
    let bouncer = start_bouncer();
    let (upstream, mut recorded) = start_upstream().await;
    let mut ctl = Control::connect(bouncer).await;
    let port = upstream.port();

    ctl.send(&format!("c 127.0.0.1 {} wings Wings T. Pigeon", port))
        .await;
    assert_eq!(ctl.recv().await, "ok connect 127.0.0.1");
    assert_eq!(upstream_line(&mut recorded).await, "NICK wings");
    assert_eq!(
        upstream_line(&mut recorded).await,
        "USER wings 8 * :Wings T. Pigeon"
    );

    ctl.send("L").await;
    assert_eq!(
        ctl.recv().await,
        format!("server 127.0.0.1 {} wings :", port)
    );
    assert_eq!(ctl.recv().await, "ok list end");

    ctl.send("j 127.0.0.1 #test").await;
    assert_eq!(ctl.recv().await, "ok join #test");
    assert_eq!(upstream_line(&mut recorded).await, "JOIN #test");

    ctl.send("L").await;
    assert_eq!(
        ctl.recv().await,
        format!("server 127.0.0.1 {} wings :#test", port)
    );
    assert_eq!(ctl.recv().await, "ok list end");

    ctl.send("w 127.0.0.1 #test hello there").await;
    assert_eq!(ctl.recv().await, "ok write #test");
    assert_eq!(
        upstream_line(&mut recorded).await,
        "PRIVMSG #test :hello there"
    );

    ctl.send("p 127.0.0.1 #test").await;
    assert_eq!(ctl.recv().await, "ok part #test");
    assert_eq!(upstream_line(&mut recorded).await, "PART #test");

    ctl.send("L").await;
    assert_eq!(
        ctl.recv().await,
        format!("server 127.0.0.1 {} wings :", port)
    );
    assert_eq!(ctl.recv().await, "ok list end");

    ctl.send("d 127.0.0.1").await;
    assert_eq!(ctl.recv().await, "ok disconnect 127.0.0.1");
    assert_eq!(
        upstream_line(&mut recorded).await,
        "QUIT :switchboard signing off"
    );

    ctl.send("L").await;
    assert_eq!(ctl.recv().await, "ok list end");
}

#[tokio::test]
async fn nick_and_raw_reach_upstream() {
    let bouncer = start_bouncer();
    let (upstream, mut recorded) = start_upstream().await;
    let mut ctl = Control::connect(bouncer).await;

    ctl.send(&format!("c 127.0.0.1 {} wings realname", upstream.port()))
        .await;
    assert_eq!(ctl.recv().await, "ok connect 127.0.0.1");
    upstream_line(&mut recorded).await; // NICK
    upstream_line(&mut recorded).await; // USER

    ctl.send("n 127.0.0.1 seagull").await;
    assert_eq!(ctl.recv().await, "ok nick seagull");
    assert_eq!(upstream_line(&mut recorded).await, "NICK seagull");

    // The stored nick changed too.
    ctl.send("L").await;
    assert_eq!(
        ctl.recv().await,
        format!("server 127.0.0.1 {} seagull :", upstream.port())
    );
    assert_eq!(ctl.recv().await, "ok list end");

    ctl.send("R 127.0.0.1 MODE #chan +o friend").await;
    assert_eq!(ctl.recv().await, "ok raw");
    assert_eq!(upstream_line(&mut recorded).await, "MODE #chan +o friend");
}

#[tokio::test]
async fn errors_leave_state_untouched() {
    let bouncer = start_bouncer();
    let mut ctl = Control::connect(bouncer).await;

    ctl.send("x something").await;
    assert_eq!(ctl.recv().await, "err Unknown command code: 'x'");

    ctl.send("d irc.nowhere.example").await;
    assert_eq!(ctl.recv().await, "err Not found: irc.nowhere.example");

    ctl.send("j irc.nowhere.example #test").await;
    assert_eq!(ctl.recv().await, "err Not found: irc.nowhere.example");

    ctl.send("j").await;
    assert_eq!(ctl.recv().await, "err Missing argument: host");

    ctl.send("L").await;
    assert_eq!(ctl.recv().await, "ok list end");
}

#[tokio::test]
async fn failed_connect_is_reported_and_unregistered() {
    let bouncer = start_bouncer();
    let mut ctl = Control::connect(bouncer).await;

    // Nothing listens on the upstream port; the connect must fail, the
    // client must hear about it, and no entry may linger.
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = unused.local_addr().unwrap().port();
    drop(unused);

    ctl.send(&format!("c 127.0.0.1 {} wings realname", port))
        .await;
    let reply = ctl.recv().await;
    assert!(
        reply.starts_with("err Connect failed: 127.0.0.1"),
        "unexpected reply: {}",
        reply
    );

    ctl.send("L").await;
    assert_eq!(ctl.recv().await, "ok list end");
}

#[tokio::test]
async fn join_rejects_invalid_channel_names() {
    let bouncer = start_bouncer();
    let (upstream, mut recorded) = start_upstream().await;
    let mut ctl = Control::connect(bouncer).await;

    ctl.send(&format!("c 127.0.0.1 {} wings realname", upstream.port()))
        .await;
    assert_eq!(ctl.recv().await, "ok connect 127.0.0.1");
    upstream_line(&mut recorded).await; // NICK
    upstream_line(&mut recorded).await; // USER

    ctl.send("j 127.0.0.1 test").await;
    assert_eq!(ctl.recv().await, "err Invalid channel name: test");

    ctl.send("p 127.0.0.1 #notjoined").await;
    assert_eq!(ctl.recv().await, "err Not found: #notjoined");

    ctl.send("w 127.0.0.1 #notjoined hello").await;
    assert_eq!(ctl.recv().await, "err Not found: #notjoined");
}

#[tokio::test]
async fn quit_closes_everything() {
    let bouncer = start_bouncer();
    let (upstream, mut recorded) = start_upstream().await;
    let mut ctl = Control::connect(bouncer).await;

    ctl.send(&format!("c 127.0.0.1 {} wings realname", upstream.port()))
        .await;
    assert_eq!(ctl.recv().await, "ok connect 127.0.0.1");
    upstream_line(&mut recorded).await; // NICK
    upstream_line(&mut recorded).await; // USER

    ctl.send("Q").await;
    assert_eq!(ctl.recv().await, "ok quit");
    ctl.recv_eof().await;

    // Upstream's stream closes too: the recorder task ends and the
    // channel drains to a close.
    let rest = timeout(WAIT, async {
        while recorded.recv().await.is_some() {}
    })
    .await;
    assert!(rest.is_ok(), "upstream connection was not closed");
}

#[tokio::test]
async fn oversized_line_closes_only_the_offender() {
    let bouncer = start_bouncer();
    let mut offender = Control::connect(bouncer).await;
    let mut bystander = Control::connect(bouncer).await;

    // Twice the default max line length, no delimiter.
    let flood = "a".repeat(2048);
    offender.write.write_all(flood.as_bytes()).await.unwrap();
    offender.write.flush().await.unwrap();
    offender.recv_eof().await;

    bystander.send("L").await;
    assert_eq!(bystander.recv().await, "ok list end");
}
