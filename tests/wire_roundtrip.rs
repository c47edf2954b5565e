use proptest::prelude::*;

use pifon::wire::{decode, encode, split_tokens};

fn nick() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,11}"
}

fn token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-zA-Z0-9_.:,\\[\\]-]{1,12}",
        "[ a-z\"\\\\\t]{1,12}",
        "[a-z\r\n]{1,6}",
        any::<String>(),
    ]
}

proptest! {
    #[test]
    fn prop_decode_inverts_encode(
        sender in nick(),
        receivers in prop::collection::vec(nick(), 0..4),
        args in prop::collection::vec(token(), 0..8),
    ) {
        let line = encode(&sender, &receivers, &args);
        let msg = decode(&line, None).unwrap();
        prop_assert_eq!(msg.sender, sender);
        if receivers.is_empty() {
            prop_assert_eq!(msg.receivers, None);
        } else {
            prop_assert_eq!(msg.receivers, Some(receivers));
        }
        prop_assert_eq!(msg.args, args);
        prop_assert!(msg.internal.is_none());
    }

    #[test]
    fn prop_plain_tokens_split_on_whitespace(
        words in prop::collection::vec("[a-z0-9]{1,8}", 0..8),
    ) {
        prop_assert_eq!(split_tokens(&words.join("  ")), words);
    }
}

#[test]
fn test_local_lines_are_internal() {
    let msg = decode("alice;|connected bob", Some("alice")).unwrap();
    assert!(msg.is_internal());

    assert!(decode("alice;|dance", Some("alice")).is_err());
    assert!(!decode("bob;|dance", Some("alice")).unwrap().is_internal());
}
