//! Redis implementation of StatusRegister.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

use crate::domain::TransactionStatus;
use crate::ports::{CasOutcome, StatusRegister, StoreResult};

const STATUS_KEY_PREFIX: &str = "tx:";
const STATUS_KEY_SUFFIX: &str = ":status";

// Read and conditional write run as one script so concurrent transitions
// on the same key serialize inside Redis.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == false then
    return {'missing'}
end
if current ~= ARGV[1] then
    return {'conflict', current}
end
redis.call('SET', KEYS[1], ARGV[2])
return {'swapped'}
"#;

pub fn status_key(id: Uuid) -> String {
    format!("{}{}{}", STATUS_KEY_PREFIX, id, STATUS_KEY_SUFFIX)
}

#[derive(Clone)]
pub struct RedisStatusRegister {
    conn: ConnectionManager,
    cas: Script,
}

impl RedisStatusRegister {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            cas: Script::new(CAS_SCRIPT),
        }
    }
}

fn parse_cas_reply(reply: Vec<String>) -> CasOutcome {
    match reply.as_slice() {
        [tag] if tag == "swapped" => CasOutcome::Swapped,
        [tag, current] if tag == "conflict" => CasOutcome::Conflict(current.clone()),
        _ => CasOutcome::NotFound,
    }
}

#[async_trait]
impl StatusRegister for RedisStatusRegister {
    async fn init_pending(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let created: bool = conn
            .set_nx(status_key(id), TransactionStatus::Pending.as_str())
            .await?;
        Ok(created)
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> StoreResult<CasOutcome> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .cas
            .key(status_key(id))
            .arg(expected.as_str())
            .arg(next.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(parse_cas_reply(reply))
    }

    async fn current(&self, id: Uuid) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(status_key(id)).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_redis;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn read_line(buf: &[u8], from: usize) -> Option<(String, usize)> {
        let end = buf[from..].windows(2).position(|w| w == b"\r\n")? + from;
        Some((String::from_utf8_lossy(&buf[from..end]).to_string(), end + 2))
    }

    /// Split complete RESP commands off the front of `buf`.
    fn take_commands(buf: &mut Vec<u8>) -> Vec<Vec<String>> {
        let mut commands = Vec::new();
        let mut consumed = 0;
        'outer: loop {
            let Some((header, mut pos)) = read_line(buf, consumed) else { break };
            let Some(count) = header.strip_prefix('*').and_then(|n| n.parse::<usize>().ok())
            else {
                break;
            };
            let mut args = Vec::with_capacity(count);
            for _ in 0..count {
                let Some((len, next)) = read_line(buf, pos) else { break 'outer };
                let Some(len) = len.strip_prefix('$').and_then(|n| n.parse::<usize>().ok())
                else {
                    break 'outer;
                };
                if buf.len() < next + len + 2 {
                    break 'outer;
                }
                args.push(String::from_utf8_lossy(&buf[next..next + len]).to_string());
                pos = next + len + 2;
            }
            commands.push(args);
            consumed = pos;
        }
        buf.drain(..consumed);
        commands
    }

    /// Minimal Redis stand-in: GET answers nil, everything else +OK. The
    /// first connection is closed right after its first GET.
    async fn serve_dropping_first(listener: TcpListener, connections: Arc<AtomicUsize>) {
        while let Ok((mut socket, _)) = listener.accept().await {
            let index = connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let read = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(read) => read,
                    };
                    buf.extend_from_slice(&chunk[..read]);
                    for command in take_commands(&mut buf) {
                        let is_get = command
                            .first()
                            .map(|name| name.eq_ignore_ascii_case("GET"))
                            .unwrap_or(false);
                        let reply: &[u8] = if is_get { b"$-1\r\n" } else { b"+OK\r\n" };
                        if socket.write_all(reply).await.is_err() {
                            return;
                        }
                        if is_get && index == 0 {
                            return;
                        }
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_register_recovers_after_connection_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        tokio::spawn(serve_dropping_first(listener, connections.clone()));

        let client = redis::Client::open(format!("redis://{}", addr)).unwrap();
        let conn = connect_redis(&client, Duration::from_secs(2)).await.unwrap();
        let register = RedisStatusRegister::new(conn);
        let id = Uuid::new_v4();

        assert_eq!(register.current(id).await.unwrap(), None);

        let mut recovered = false;
        for _ in 0..20 {
            if let Ok(value) = register.current(id).await {
                assert_eq!(value, None);
                recovered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert!(recovered, "register never reconnected");
        assert!(connections.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_status_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            status_key(id),
            "tx:00000000-0000-0000-0000-000000000000:status"
        );
    }

    #[test]
    fn test_parse_cas_reply() {
        assert_eq!(parse_cas_reply(vec!["swapped".into()]), CasOutcome::Swapped);
        assert_eq!(parse_cas_reply(vec!["missing".into()]), CasOutcome::NotFound);
        assert_eq!(
            parse_cas_reply(vec!["conflict".into(), "approved".into()]),
            CasOutcome::Conflict("approved".to_string())
        );
    }
}
