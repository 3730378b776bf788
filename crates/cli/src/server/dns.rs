use aegis_dns_domain::{Proto, QueryOrigin};
use aegis_dns_infrastructure::CoreHandle;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// In-flight requests get this long to finish once shutdown starts.
const DRAIN_PERIOD: Duration = Duration::from_secs(5);
/// Largest inbound query we accept.
const MAX_QUERY_SIZE: usize = 4096;

/// Plain UDP + TCP listeners on one bind address. Every accepted query runs
/// on its own task; the core handle is dereferenced per request, so a config
/// apply takes effect without touching the listeners.
pub async fn serve(
    bind: SocketAddr,
    core: Arc<CoreHandle>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let udp = bind_udp(bind)?;
    let tcp = TcpListener::bind(bind).await?;
    info!(bind = %bind, "DNS listeners ready");

    let tracker = TaskTracker::new();
    let udp_task = tokio::spawn(udp_loop(
        udp,
        Arc::clone(&core),
        tracker.clone(),
        shutdown.clone(),
    ));
    let tcp_task = tokio::spawn(tcp_loop(tcp, core, tracker.clone(), shutdown.clone()));

    shutdown.cancelled().await;
    let _ = udp_task.await;
    let _ = tcp_task.await;

    // Drain: give in-flight requests a short grace period, then abandon.
    tracker.close();
    if tokio::time::timeout(DRAIN_PERIOD, tracker.wait()).await.is_err() {
        warn!(bind = %bind, "Drain period elapsed with requests still in flight");
    }
    info!(bind = %bind, "DNS listeners stopped");
    Ok(())
}

/// UDP socket with enlarged buffers; DNS bursts overflow the defaults.
fn bind_udp(bind: SocketAddr) -> anyhow::Result<UdpSocket> {
    let domain = if bind.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(4 * 1024 * 1024)?;
    socket.set_send_buffer_size(4 * 1024 * 1024)?;
    socket.bind(&bind.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

async fn udp_loop(
    socket: UdpSocket,
    core: Arc<CoreHandle>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
) {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; MAX_QUERY_SIZE];

    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "UDP recv failed");
                    continue;
                }
            },
        };

        let packet = buf[..len].to_vec();
        let socket = Arc::clone(&socket);
        let core = Arc::clone(&core);
        tracker.spawn(async move {
            let origin = QueryOrigin::plain(peer, Proto::Udp);
            let pipeline = core.current().pipeline.clone();
            if let Some(response) = pipeline.handle(&packet, &origin).await {
                if let Err(e) = socket.send_to(&response, peer).await {
                    debug!(peer = %peer, error = %e, "UDP send failed");
                }
            }
        });
    }
}

async fn tcp_loop(
    listener: TcpListener,
    core: Arc<CoreHandle>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "TCP accept failed");
                    continue;
                }
            },
        };

        let core = Arc::clone(&core);
        let tracker_inner = tracker.clone();
        let shutdown = shutdown.clone();
        tracker.spawn(async move {
            if let Err(e) =
                tcp_connection(stream, peer, core, tracker_inner, shutdown).await
            {
                debug!(peer = %peer, error = %e, "TCP connection ended");
            }
        });
    }
}

/// One TCP connection: length-prefixed queries in, responses written in
/// completion order (a shared writer serialises the frames, not the
/// requests).
async fn tcp_connection(
    stream: TcpStream,
    peer: SocketAddr,
    core: Arc<CoreHandle>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    stream.set_nodelay(true).ok();
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));

    loop {
        let mut len_buf = [0u8; 2];
        tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_exact(&mut len_buf) => {
                if read.is_err() {
                    break; // peer closed
                }
            }
        }

        let len = u16::from_be_bytes(len_buf) as usize;
        if len == 0 || len > MAX_QUERY_SIZE {
            break;
        }
        let mut packet = vec![0u8; len];
        reader.read_exact(&mut packet).await?;

        let core = Arc::clone(&core);
        let writer = Arc::clone(&writer);
        tracker.spawn(async move {
            let origin = QueryOrigin::plain(peer, Proto::Tcp);
            let pipeline = core.current().pipeline.clone();
            if let Some(response) = pipeline.handle(&packet, &origin).await {
                let Ok(frame_len) = u16::try_from(response.len()) else {
                    return;
                };
                let mut writer = writer.lock().await;
                let write = async {
                    writer.write_all(&frame_len.to_be_bytes()).await?;
                    writer.write_all(&response).await
                };
                if let Err(e) = write.await {
                    debug!(peer = %peer, error = %e, "TCP write failed");
                }
            }
        });
    }

    Ok(())
}
