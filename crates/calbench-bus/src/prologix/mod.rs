//! Prologix LAN-GPIB 控制器适配器
//!
//! 通过 TCP 连接 GPIB-ETHERNET 控制器，使用 `++` 指令方言：
//!
//! | 操作 | 控制器指令 |
//! |------|-----------|
//! | 读取一行 | `++read eoi` |
//! | 总线触发 | `++trg` |
//! | 设备清除 | `++clr` |
//! | 返回本地 | `++loc` |
//! | SRQ 线状态 | `++srq` |
//! | 串行轮询 | `++spoll <addr>` |
//!
//! # SRQ 通知
//!
//! 控制器不会主动推送 SRQ，因此适配器在注册回调后启动一个 watcher 线程：
//! 仅在 `assert_trigger()` 之后（布防状态）轮询 `++srq`，检测到请求后做一次串行轮询
//! 取得状态字节并调用回调。回调调用 `discard_pending_events()` 之前不会再次轮询，
//! 与 VISA 的事件队列语义一致。
//!
//! 布防期间测试序列线程阻塞在完成信号上，不会访问会话，因此 watcher 与
//! 序列线程不会在同一个查询中交错读写。

use crate::{BusError, EventQueue, InstrumentBus, ServiceRequest, ServiceRequestHandler};
use calbench_protocol::StatusByte;
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// `++read_tmo_ms` 的上限（控制器固件限制）
const MAX_READ_TMO_MS: u64 = 3000;

/// SRQ 轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 需要 ESC 转义的数据字符（CR、LF、ESC、'+'）
const ESCAPED: [char; 4] = ['\r', '\n', '\x1b', '+'];

/// 转义发往仪器的数据，避免被控制器当作行结束或 `++` 指令
pub fn escape_payload(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if ESCAPED.contains(&c) {
            out.push('\x1b');
        }
        out.push(c);
    }
    out
}

/// TCP 连接（读写共享同一个 socket）
struct Link {
    reader: BufReader<TcpStream>,
}

impl Link {
    fn write_raw(&mut self, line: &str) -> Result<(), BusError> {
        trace!("prologix <- {}", line);
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, BusError> {
        let mut buf = String::new();
        match self.reader.read_line(&mut buf) {
            Ok(0) => Err(BusError::Disconnected),
            Ok(_) => {
                let line = buf.trim_end_matches(['\r', '\n']).to_string();
                trace!("prologix -> {}", line);
                Ok(line)
            },
            Err(e) => {
                let err = BusError::Io(e);
                if err.is_timeout() { Err(BusError::Timeout) } else { Err(err) }
            },
        }
    }
}

/// SRQ 布防状态（同时作为回调的事件确认接口）
#[derive(Default)]
struct SrqState {
    /// 已触发，等待完成通知
    armed: AtomicBool,
    /// 已通知回调，等待确认
    awaiting_discard: AtomicBool,
}

impl EventQueue for SrqState {
    fn discard_pending_events(&self) -> Result<(), BusError> {
        self.armed.store(false, Ordering::Release);
        self.awaiting_discard.store(false, Ordering::Release);
        Ok(())
    }
}

/// SRQ watcher 线程
struct SrqWatcher {
    /// Drop 时关闭，通知线程退出
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for SrqWatcher {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("SRQ watcher thread panicked");
        }
    }
}

/// Prologix LAN-GPIB 会话
pub struct PrologixBus {
    link: Arc<Mutex<Link>>,
    gpib: u8,
    timeout: Duration,
    srq: Arc<SrqState>,
    handler: Arc<Mutex<Option<ServiceRequestHandler>>>,
    watcher: Option<SrqWatcher>,
}

impl PrologixBus {
    /// 连接控制器并选中 GPIB 地址
    ///
    /// 初始化序列：控制器模式、关闭自动读取、EOI 结束、LF 终止符、目标地址。
    pub fn connect(host: &str, port: u16, gpib: u8, timeout: Duration) -> Result<Self, BusError> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| BusError::InvalidAddress(format!("cannot resolve {host}:{port}")))?;

        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let mut bus = Self {
            link: Arc::new(Mutex::new(Link {
                reader: BufReader::new(stream),
            })),
            gpib,
            timeout,
            srq: Arc::new(SrqState::default()),
            handler: Arc::new(Mutex::new(None)),
            watcher: None,
        };

        {
            let mut link = bus.link.lock();
            link.write_raw("++mode 1")?;
            link.write_raw("++auto 0")?;
            link.write_raw("++eoi 1")?;
            link.write_raw("++eos 2")?;
            link.write_raw(&format!("++addr {}", gpib))?;
        }
        bus.apply_read_tmo()?;

        debug!("Connected to Prologix controller {} (GPIB {})", addr, gpib);
        Ok(bus)
    }

    /// GPIB 地址
    pub fn gpib_address(&self) -> u8 {
        self.gpib
    }

    fn apply_read_tmo(&mut self) -> Result<(), BusError> {
        let tmo = (self.timeout.as_millis() as u64).clamp(1, MAX_READ_TMO_MS);
        self.link.lock().write_raw(&format!("++read_tmo_ms {}", tmo))
    }

    fn spawn_watcher(&mut self) {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let link = self.link.clone();
        let srq = self.srq.clone();
        let handler = self.handler.clone();
        let gpib = self.gpib;

        let handle = spawn(move || {
            loop {
                match stop_rx.recv_timeout(POLL_INTERVAL) {
                    Err(RecvTimeoutError::Timeout) => {},
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                if !srq.armed.load(Ordering::Acquire) || srq.awaiting_discard.load(Ordering::Acquire)
                {
                    continue;
                }

                let status = match poll_status(&link, gpib) {
                    Ok(Some(status)) => status,
                    Ok(None) => continue,
                    Err(BusError::Disconnected) => {
                        warn!("SRQ watcher: session disconnected, stopping");
                        break;
                    },
                    Err(e) => {
                        warn!("SRQ watcher: poll failed: {}", e);
                        continue;
                    },
                };

                srq.awaiting_discard.store(true, Ordering::Release);
                let current = handler.lock().clone();
                if let Some(callback) = current {
                    callback(&ServiceRequest::new(status, srq.as_ref()));
                }
            }
        });

        self.watcher = Some(SrqWatcher {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        });
    }
}

/// 查询 SRQ 线；有请求时串行轮询取状态字节
fn poll_status(link: &Mutex<Link>, gpib: u8) -> Result<Option<StatusByte>, BusError> {
    let mut link = link.lock();
    link.write_raw("++srq")?;
    if link.read_line()?.trim() != "1" {
        return Ok(None);
    }

    link.write_raw(&format!("++spoll {}", gpib))?;
    let raw = link.read_line()?;
    let value = raw
        .trim()
        .parse::<u8>()
        .map_err(|_| BusError::Device(format!("invalid serial poll response {raw:?}")))?;
    Ok(Some(StatusByte(value)))
}

impl InstrumentBus for PrologixBus {
    fn write_line(&mut self, line: &str) -> Result<(), BusError> {
        self.link.lock().write_raw(&escape_payload(line))
    }

    fn read_line(&mut self) -> Result<String, BusError> {
        let mut link = self.link.lock();
        link.write_raw("++read eoi")?;
        link.read_line()
    }

    fn assert_trigger(&mut self) -> Result<(), BusError> {
        self.link.lock().write_raw("++trg")?;
        self.srq.armed.store(true, Ordering::Release);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), BusError> {
        self.link.lock().write_raw("++clr")
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if let Err(e) = self.link.lock().reader.get_ref().set_read_timeout(Some(timeout)) {
            warn!("Failed to apply socket read timeout: {}", e);
        }
        if let Err(e) = self.apply_read_tmo() {
            warn!("Failed to apply controller read timeout: {}", e);
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn on_service_request(&mut self, handler: ServiceRequestHandler) -> Result<(), BusError> {
        *self.handler.lock() = Some(handler);
        if self.watcher.is_none() {
            self.spawn_watcher();
        }
        Ok(())
    }

    fn return_to_local(&mut self) -> Result<(), BusError> {
        self.link.lock().write_raw("++loc")
    }
}
