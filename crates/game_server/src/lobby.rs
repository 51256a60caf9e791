//! Lobby table and join resolution.
//!
//! Lobbies are addressed on the wire by an `i32` code. Four-letter codes are
//! the code's little-endian ASCII bytes, so `"ABCD"` and its `i32` form are
//! interchangeable. A [`LobbyJoinHook`] turns the code a player asked for into
//! the lobby they actually join; the default hook only accepts exact codes.

use crate::connection::{Connection, ConnectionId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Wire code of a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LobbyCode(pub i32);

impl LobbyCode {
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl FromStr for LobbyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("Lobby code must be four letters: {s:?}"))?;

        if !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(format!("Lobby code must be four letters: {s:?}"));
        }

        Ok(LobbyCode(i32::from_le_bytes(bytes.map(|byte| byte.to_ascii_uppercase()))))
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();
        if bytes.iter().all(u8::is_ascii_alphabetic) {
            bytes.iter().try_for_each(|byte| write!(f, "{}", *byte as char))
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Snapshot of one lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyInfo {
    pub code: LobbyCode,
    pub public: bool,
    pub max_players: usize,
    pub players: Vec<ConnectionId>,
}

impl LobbyInfo {
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }
}

/// All lobbies hosted by the server.
#[derive(Debug, Default)]
pub struct LobbyTable {
    lobbies: DashMap<LobbyCode, LobbyInfo>,
}

impl LobbyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a lobby. Returns `false` if the code is already in use.
    pub fn create(&self, code: LobbyCode, public: bool, max_players: usize) -> bool {
        if self.lobbies.contains_key(&code) {
            return false;
        }

        self.lobbies.insert(
            code,
            LobbyInfo {
                code,
                public,
                max_players,
                players: Vec::new(),
            },
        );
        info!("🏠 Lobby {} created (public: {}, max players: {})", code, public, max_players);
        true
    }

    pub fn get(&self, code: LobbyCode) -> Option<LobbyInfo> {
        self.lobbies.get(&code).map(|lobby| lobby.clone())
    }

    pub fn set_public(&self, code: LobbyCode, public: bool) {
        if let Some(mut lobby) = self.lobbies.get_mut(&code) {
            lobby.public = public;
        }
    }

    pub fn remove(&self, code: LobbyCode) -> Option<LobbyInfo> {
        self.lobbies.remove(&code).map(|(_, lobby)| lobby)
    }

    /// Public lobbies with at least one free slot.
    pub fn joinable_public(&self) -> Vec<LobbyCode> {
        self.lobbies
            .iter()
            .filter(|lobby| lobby.public && !lobby.is_full())
            .map(|lobby| lobby.code)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Adds `connection` to `code`, leaving any lobby it was in.
    pub fn join(&self, connection: &Connection, code: LobbyCode) -> bool {
        let joined = match self.lobbies.get_mut(&code) {
            Some(mut lobby) if !lobby.is_full() => {
                if !lobby.players.contains(&connection.id()) {
                    lobby.players.push(connection.id());
                }
                true
            }
            _ => false,
        };

        if joined {
            if let Some(previous) = connection.set_lobby(Some(code)) {
                if previous != code {
                    self.remove_player(previous, connection.id());
                }
            }
            debug!("Connection {} joined lobby {}", connection.id(), code);
        }

        joined
    }

    pub fn leave(&self, connection: &Connection) {
        if let Some(code) = connection.set_lobby(None) {
            self.remove_player(code, connection.id());
            debug!("Connection {} left lobby {}", connection.id(), code);
        }
    }

    fn remove_player(&self, code: LobbyCode, id: ConnectionId) {
        if let Some(mut lobby) = self.lobbies.get_mut(&code) {
            lobby.players.retain(|player| *player != id);
        }
    }
}

/// Resolves the lobby code a player asked for into the lobby to join.
pub trait LobbyJoinHook: Send + Sync + 'static {
    fn resolve(&self, requested: &str, lobbies: &LobbyTable) -> Option<LobbyCode>;
}

/// Joins the exact lobby requested, if it exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactCodeJoin;

impl LobbyJoinHook for ExactCodeJoin {
    fn resolve(&self, requested: &str, lobbies: &LobbyTable) -> Option<LobbyCode> {
        let code = requested.parse::<LobbyCode>().ok()?;
        lobbies.get(code).map(|lobby| lobby.code)
    }
}

impl<F> LobbyJoinHook for F
where
    F: Fn(&str, &LobbyTable) -> Option<LobbyCode> + Send + Sync + 'static,
{
    fn resolve(&self, requested: &str, lobbies: &LobbyTable) -> Option<LobbyCode> {
        self(requested, lobbies)
    }
}

pub(crate) type SharedJoinHook = Arc<dyn LobbyJoinHook>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn connection(id: ConnectionId) -> Connection {
        let (sender, _) = mpsc::unbounded_channel();
        let addr: SocketAddr = format!("127.0.0.1:{}", 42000 + id).parse().unwrap();
        Connection::new(id, addr, sender)
    }

    #[test]
    fn test_code_conversion() {
        let code: LobbyCode = "abcd".parse().unwrap();
        assert_eq!(code.as_i32(), i32::from_le_bytes(*b"ABCD"));
        assert_eq!(code.to_string(), "ABCD");
        assert_eq!(LobbyCode(-1).to_string(), "-1");
        assert!("ABC".parse::<LobbyCode>().is_err());
        assert!("AB1D".parse::<LobbyCode>().is_err());
    }

    #[test]
    fn test_join_respects_capacity_and_moves_players() {
        let lobbies = LobbyTable::new();
        let first: LobbyCode = "AAAA".parse().unwrap();
        let second: LobbyCode = "BBBB".parse().unwrap();
        assert!(lobbies.create(first, true, 1));
        assert!(lobbies.create(second, true, 4));
        assert!(!lobbies.create(first, false, 4));

        let a = connection(1);
        let b = connection(2);
        assert!(lobbies.join(&a, first));
        assert!(!lobbies.join(&b, first));

        assert!(lobbies.join(&a, second));
        assert_eq!(a.lobby(), Some(second));
        assert!(lobbies.get(first).unwrap().players.is_empty());

        lobbies.leave(&a);
        assert_eq!(a.lobby(), None);
        assert!(lobbies.get(second).unwrap().players.is_empty());
    }

    #[test]
    fn test_joinable_public() {
        let lobbies = LobbyTable::new();
        let open: LobbyCode = "OPEN".parse().unwrap();
        let full: LobbyCode = "FULL".parse().unwrap();
        let hidden: LobbyCode = "HIDE".parse().unwrap();
        lobbies.create(open, true, 10);
        lobbies.create(full, true, 1);
        lobbies.create(hidden, false, 10);
        lobbies.join(&connection(1), full);

        assert_eq!(lobbies.joinable_public(), vec![open]);
    }

    #[test]
    fn test_exact_code_join() {
        let lobbies = LobbyTable::new();
        let code: LobbyCode = "ABCD".parse().unwrap();
        lobbies.create(code, false, 10);

        assert_eq!(ExactCodeJoin.resolve("abcd", &lobbies), Some(code));
        assert_eq!(ExactCodeJoin.resolve("WXYZ", &lobbies), None);
        assert_eq!(ExactCodeJoin.resolve("RANDOM", &lobbies), None);
    }
}
