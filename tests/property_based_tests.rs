mod common;

use common::strategies::*;
use proptest::prelude::*;
use runbook_listener::runbook::{
    decode_payload, CommandTemplate, DispatchError, Dispatcher, RunbookAction, ServicePolicy,
};

fn dispatcher() -> Dispatcher {
    Dispatcher::new(ServicePolicy::default(), CommandTemplate::default())
}

proptest! {
    /// Property: dispatch returns the payload text unchanged for safe names
    #[test]
    fn dispatch_is_identity_for_safe_names(name in service_name_strategy()) {
        let identifier = dispatcher().dispatch(name.as_bytes()).unwrap();
        prop_assert_eq!(identifier.as_str(), name.as_str());
    }

    /// Property: decoding never trims or rewrites the text
    #[test]
    fn decode_preserves_any_non_empty_text(text in non_empty_text_strategy()) {
        let identifier = decode_payload(text.as_bytes()).unwrap();
        prop_assert_eq!(identifier.as_str(), text.as_str());
    }

    /// Property: the restart command always targets exactly the named service
    #[test]
    fn restart_command_targets_named_service(name in service_name_strategy()) {
        let action = dispatcher().resolve(name.as_bytes()).unwrap();
        prop_assert_eq!(action.command_line(), format!("docker compose restart {name}"));

        let argv = action.argv();
        prop_assert_eq!(argv.len(), 4);
        prop_assert_eq!(argv.last().map(String::as_str), Some(name.as_str()));
    }

    /// Property: names carrying shell metacharacters never yield an action
    #[test]
    fn metacharacters_are_rejected(name in unsafe_service_name_strategy()) {
        let result = dispatcher().resolve(name.as_bytes());
        prop_assert!(
            matches!(result, Err(DispatchError::UnsafeIdentifier { .. })),
            "expected {:?} to be rejected, got {:?}", name, result
        );
    }

    /// Property: whatever the identifier holds, it stays one argument
    #[test]
    fn identifier_is_a_single_argument(text in non_empty_text_strategy()) {
        let identifier = decode_payload(text.as_bytes()).unwrap();
        let action = RunbookAction::restart(identifier, CommandTemplate::default());
        let args = action.args();
        prop_assert_eq!(args.len(), 3);
        prop_assert_eq!(args[2].as_str(), text.as_str());
    }
}
