//! Line codec for the intercom channel.
//!
//! Every line has the form `sender;recv1,recv2|token token ...`. An empty
//! receiver list means the line is broadcast to the whole room. Tokens are
//! separated by whitespace; tokens that would not survive the split are
//! double-quoted with `"` and `\` escaped by a backslash. Line breaks inside
//! a quoted token are written as `\n` and `\r`.

use tracing::trace;

/// Reasons a line could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("line has no '|' separating prefix and payload")]
    MissingPipe,
    #[error("prefix has no ';' separating sender and receivers")]
    MissingSemicolon,
    #[error("invalid internal message: {0}")]
    InvalidInternal(String),
}

/// Payload of a line the transport itself emitted for the local identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Internal {
    /// A member joined the room (possibly ourselves)
    Connected(String),
    /// A member left the room (possibly ourselves)
    Disconnected(String),
    /// The transport asks the agent to shut down
    Exit,
}

/// A decoded line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    /// `None` for broadcast lines
    pub receivers: Option<Vec<String>>,
    pub args: Vec<String>,
    /// Set when the sender is the local identity
    pub internal: Option<Internal>,
}

impl Message {
    /// Build a non-internal message, mostly useful for local loopback
    pub fn new(
        sender: impl Into<String>,
        receivers: Option<Vec<String>>,
        args: Vec<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receivers,
            args,
            internal: None,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.internal.is_some()
    }

    pub fn is_broadcast(&self) -> bool {
        self.receivers.is_none()
    }

    /// True if `nick` is listed as an explicit receiver
    pub fn is_addressed_to(&self, nick: &str) -> bool {
        self.receivers
            .as_ref()
            .is_some_and(|r| r.iter().any(|n| n == nick))
    }
}

/// Encode a line. An empty receiver slice encodes a broadcast.
pub fn encode<S: AsRef<str>>(sender: &str, receivers: &[S], args: &[S]) -> String {
    let receivers = receivers
        .iter()
        .map(|r| r.as_ref())
        .collect::<Vec<_>>()
        .join(",");
    let payload = args
        .iter()
        .map(|a| quote_token(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{};{}|{}", sender, receivers, payload)
}

/// Decode a line. `local_nick` marks lines from ourselves as internal; pass
/// `None` before the identity is known (the startup handshake).
pub fn decode(line: &str, local_nick: Option<&str>) -> Result<Message, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (prefix, payload) = line.split_once('|').ok_or(DecodeError::MissingPipe)?;
    let (sender, receivers) = prefix
        .split_once(';')
        .ok_or(DecodeError::MissingSemicolon)?;

    let receivers = if receivers.is_empty() {
        None
    } else {
        Some(receivers.split(',').map(str::to_string).collect())
    };
    let args = split_tokens(payload);

    let internal = match local_nick {
        Some(nick) if nick == sender => Some(parse_internal(&args)?),
        _ => None,
    };

    trace!(target: "wire", "decoded {} tokens from {}", args.len(), sender);

    Ok(Message {
        sender: sender.to_string(),
        receivers,
        args,
        internal,
    })
}

fn parse_internal(args: &[String]) -> Result<Internal, DecodeError> {
    let Some(cmd) = args.first() else {
        return Err(DecodeError::InvalidInternal("empty".to_string()));
    };
    match cmd.as_str() {
        "connected" | "disconnected" if args.len() > 1 => {
            let nick = args[1..].join(" ");
            if cmd == "connected" {
                Ok(Internal::Connected(nick))
            } else {
                Ok(Internal::Disconnected(nick))
            }
        }
        "exit" if args.len() == 1 => Ok(Internal::Exit),
        _ => Err(DecodeError::InvalidInternal(args.join(" "))),
    }
}

fn needs_quoting(token: &str) -> bool {
    token.is_empty() || token.contains([' ', '\t', '"', '\\', '\n', '\r'])
}

/// Quote a single token if it would otherwise not survive `split_tokens`
pub fn quote_token(token: &str) -> String {
    if !needs_quoting(token) {
        return token.to_string();
    }
    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    for c in token.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Split a payload into tokens, undoing `quote_token`.
///
/// A `"` anywhere in an unquoted run opens a quoted section that continues
/// the same token, so `a"b c"d` is the single token `ab cd`.
pub fn split_tokens(payload: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cur: Option<String> = None;
    let mut in_str = false;
    let mut escaped = false;

    for c in payload.chars() {
        if in_str {
            let buf = cur.get_or_insert_with(String::new);
            if escaped {
                buf.push(match c {
                    'n' => '\n',
                    'r' => '\r',
                    _ => c,
                });
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_str = false;
            } else {
                buf.push(c);
            }
        } else if c == ' ' || c == '\t' {
            if let Some(tok) = cur.take() {
                tokens.push(tok);
            }
        } else {
            let buf = cur.get_or_insert_with(String::new);
            if c == '"' {
                in_str = true;
            } else {
                buf.push(c);
            }
        }
    }
    if let Some(tok) = cur {
        tokens.push(tok);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_plain() {
        let line = encode("alice", &["bob", "carol"], &["echo", "ping"]);
        assert_eq!(line, "alice;bob,carol|echo ping");
    }

    #[test]
    fn test_encode_broadcast_and_quoting() {
        let none: [&str; 0] = [];
        let line = encode("alice", &none, &[]);
        assert_eq!(line, "alice;|");

        let line = encode("alice", &[], &["say", "hello world", "", "a\"b", "c\\d"]);
        assert_eq!(line, r#"alice;|say "hello world" "" "a\"b" "c\\d""#);
    }

    #[test]
    fn test_decode_broadcast() {
        let msg = decode("bob;|echo ping", Some("alice")).unwrap();
        assert_eq!(msg.sender, "bob");
        assert!(msg.is_broadcast());
        assert_eq!(msg.args, vec!["echo", "ping"]);
        assert!(!msg.is_internal());
    }

    #[test]
    fn test_decode_receivers() {
        let msg = decode("bob;alice,carol|x", Some("alice")).unwrap();
        assert_eq!(
            msg.receivers,
            Some(vec!["alice".to_string(), "carol".to_string()])
        );
        assert!(msg.is_addressed_to("alice"));
        assert!(!msg.is_addressed_to("dave"));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode("bob;alice", None), Err(DecodeError::MissingPipe));
        assert_eq!(decode("bob|x", None), Err(DecodeError::MissingSemicolon));
    }

    #[test]
    fn test_decode_internal() {
        let msg = decode("alice;|connected bob the builder", Some("alice")).unwrap();
        assert_eq!(
            msg.internal,
            Some(Internal::Connected("bob the builder".to_string()))
        );

        let msg = decode("alice;|disconnected alice", Some("alice")).unwrap();
        assert_eq!(msg.internal, Some(Internal::Disconnected("alice".to_string())));

        let msg = decode("alice;|exit", Some("alice")).unwrap();
        assert_eq!(msg.internal, Some(Internal::Exit));
    }

    #[test]
    fn test_decode_invalid_internal() {
        assert!(matches!(
            decode("alice;|hello", Some("alice")),
            Err(DecodeError::InvalidInternal(_))
        ));
        assert!(matches!(
            decode("alice;|connected", Some("alice")),
            Err(DecodeError::InvalidInternal(_))
        ));
        assert!(matches!(
            decode("alice;|exit now", Some("alice")),
            Err(DecodeError::InvalidInternal(_))
        ));
        assert!(matches!(
            decode("alice;|", Some("alice")),
            Err(DecodeError::InvalidInternal(_))
        ));
    }

    #[test]
    fn test_split_tokens() {
        assert_eq!(split_tokens("  a \t b  "), vec!["a", "b"]);
        assert_eq!(split_tokens(r#"a"b c"d"#), vec!["ab cd"]);
        assert_eq!(split_tokens(r#""" x"#), vec!["", "x"]);
        assert_eq!(split_tokens(r#""q\"\\""#), vec!["q\"\\"]);
        assert!(split_tokens("").is_empty());
    }

    #[test]
    fn test_line_breaks_are_escaped() {
        let line = encode("me", &[], &["two\nlines", "cr\r"]);
        assert_eq!(line, r#"me;|"two\nlines" "cr\r""#);
        assert!(!line.contains(['\n', '\r']));
        let msg = decode(&line, None).unwrap();
        assert_eq!(msg.args, vec!["two\nlines", "cr\r"]);
    }

    #[test]
    fn test_round_trip_edge_tokens() {
        let args = vec!["", " ", "\"", "\\", "tab\there", "plain"];
        let line = encode("me", &["you"], &args);
        let msg = decode(&line, Some("other")).unwrap();
        assert_eq!(msg.args, args);
        assert_eq!(msg.receivers, Some(vec!["you".to_string()]));
    }
}
