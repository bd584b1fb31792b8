//! End-to-end command correlation: attended transfer request, registration,
//! and each kind of outcome delivered to the caller

use std::sync::Arc;

use parking_lot::Mutex;

use ami_core::prelude::*;

type Calls = Arc<Mutex<Vec<CommandResult>>>;

fn spy() -> (Calls, ResponseCallback) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    (calls, Box::new(move |result| sink.lock().push(result)))
}

fn setup() -> (AmiClient, tokio::sync::mpsc::UnboundedReceiver<Action>) {
    let (connection, outbound) = ChannelConnection::new();
    let client = AmiClient::builder(AmiConfig::default().with_action_id_prefix("it"))
        .connection(Arc::new(connection))
        .build()
        .unwrap();
    (client, outbound)
}

fn transfer_args() -> CommandArgs {
    CommandArgs::from_pairs([("chToTransfer", "SIP/214-0000012"), ("to", "220")])
}

#[test]
fn test_transfer_request_is_registered_and_sent() {
    let (client, mut outbound) = setup();
    let (calls, cb) = spy();

    let id = client.execute("attendedTransfer", &transfer_args(), cb).unwrap();

    let action = outbound.try_recv().unwrap();
    assert_eq!(action.name(), "Atxfer");
    assert_eq!(action.action_id(), Some(&id));
    assert_eq!(action.get("Exten"), Some("220#"));
    assert_eq!(action.get("Channel"), Some("SIP/214-0000012"));
    assert_eq!(action.get("Context"), Some("from-internal"));
    assert_eq!(action.get("Priority"), Some("1"));

    assert_eq!(client.pending_count(), 1);
    assert!(client.registry().contains(&id));
    assert!(calls.lock().is_empty());
}

#[test]
fn test_transfer_success() {
    let (client, _outbound) = setup();
    let (calls, cb) = spy();
    let id = client.execute("attendedTransfer", &transfer_args(), cb).unwrap();

    let response = Frame::from_pairs([("Response", "Success"), ("ActionID", id.as_str())]);
    assert_eq!(client.dispatcher().dispatch(&response), DispatchOutcome::Correlated);

    assert_eq!(*calls.lock(), vec![Ok(CommandOutput::Done)]);
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn test_transfer_protocol_error() {
    let (client, _outbound) = setup();
    let (calls, cb) = spy();
    let id = client.execute("attendedTransfer", &transfer_args(), cb).unwrap();

    let response = Frame::from_pairs([
        ("Response", "Error"),
        ("ActionID", id.as_str()),
        ("Message", "Channel not found"),
    ]);
    client.dispatcher().dispatch(&response);

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    let err = calls[0].clone().unwrap_err();
    assert_eq!(err, AmiError::Protocol { message: "Channel not found".into() });
    assert_eq!(err.to_string(), "Channel not found");
}

#[test]
fn test_missing_status_is_generic_failure() {
    let (client, _outbound) = setup();
    let (calls, cb) = spy();
    let id = client.execute("attendedTransfer", &transfer_args(), cb).unwrap();

    let response = Frame::from_pairs([("Response", "Goodbye"), ("ActionID", id.as_str())]);
    client.dispatcher().dispatch(&response);
    assert_eq!(*calls.lock(), vec![Err(AmiError::Failed)]);
}

#[test]
fn test_interleaved_responses_reach_their_own_callbacks() {
    let (client, _outbound) = setup();
    let mut pending = Vec::new();
    for i in 0..10 {
        let (calls, cb) = spy();
        let args = CommandArgs::from_pairs([("channel", format!("SIP/2{:02}-0000001", i))]);
        let id = client.execute("hangup", &args, cb).unwrap();
        pending.push((id, calls));
    }

    // Answer in reverse, with events and a stray response in between
    for (i, (id, _)) in pending.iter().enumerate().rev() {
        let status = if i % 2 == 0 { "Success" } else { "Error" };
        client.dispatcher().dispatch(&Frame::from_pairs([
            ("Event", "Newchannel"),
            ("Channel", "SIP/999-00000001"),
        ]));
        client.dispatcher().dispatch(&Frame::from_pairs([
            ("Response", status),
            ("ActionID", id.as_str()),
            ("Message", "No such channel"),
        ]));
        assert_eq!(
            client.dispatcher().dispatch(&Frame::from_pairs([("Response", "Success"), ("ActionID", "it-stray-1")])),
            DispatchOutcome::Unmatched
        );
    }

    for (i, (_, calls)) in pending.iter().enumerate() {
        let calls = calls.lock();
        assert_eq!(calls.len(), 1, "callback {} invoked {} times", i, calls.len());
        if i % 2 == 0 {
            assert_eq!(calls[0], Ok(CommandOutput::Done));
        } else {
            assert_eq!(calls[0], Err(AmiError::Protocol { message: "No such channel".into() }));
        }
    }
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn test_transmission_failure_leaves_no_registration() {
    let (client, outbound) = setup();
    drop(outbound);
    let (calls, cb) = spy();

    assert!(client.execute("attendedTransfer", &transfer_args(), cb).is_none());
    assert!(matches!(calls.lock()[0], Err(AmiError::Transmission(_))));
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn test_callback_issuing_follow_up_command() {
    let (client, mut outbound) = setup();
    let client = Arc::new(client);
    let (follow_up_calls, follow_up_cb) = spy();
    let follow_up_id = Arc::new(Mutex::new(None));

    let c = client.clone();
    let slot = follow_up_id.clone();
    let first = client
        .execute(
            "attendedTransfer",
            &transfer_args(),
            Box::new(move |_| {
                *slot.lock() = c.execute("ping", &CommandArgs::new(), follow_up_cb);
            }),
        )
        .unwrap();

    client
        .dispatcher()
        .dispatch(&Frame::from_pairs([("Response", "Success"), ("ActionID", first.as_str())]));

    let follow_up = follow_up_id.lock().clone().unwrap();
    assert!(client.registry().contains(&follow_up));
    assert!(!client.registry().contains(&first));
    assert!(follow_up_calls.lock().is_empty());

    outbound.try_recv().unwrap();
    assert_eq!(outbound.try_recv().unwrap().name(), "Ping");
}
