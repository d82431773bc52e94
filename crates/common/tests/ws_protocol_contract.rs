use sherpa_common::protocol::ws::{
    ClientMessage, EventKind, CLIENT_MESSAGE_TYPES, SERVER_EVENT_KINDS,
};
use sherpa_common::types::TopicKey;

fn load_contract() -> serde_json::Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/ws-protocol.json");
    let content = std::fs::read_to_string(path).expect("contract file should be readable");
    serde_json::from_str(&content).expect("contract file should be valid JSON")
}

fn string_list<'a>(contract: &'a serde_json::Value, key: &str) -> Vec<&'a str> {
    contract[key]
        .as_array()
        .unwrap_or_else(|| panic!("{key} should be an array"))
        .iter()
        .map(|v| v.as_str().expect("entry should be a string"))
        .collect()
}

#[test]
fn client_message_types_match_contract() {
    let contract = load_contract();
    assert_eq!(CLIENT_MESSAGE_TYPES, &string_list(&contract, "client_message_types")[..]);
}

#[test]
fn server_event_kinds_match_contract() {
    let contract = load_contract();
    let expected = string_list(&contract, "server_event_kinds");
    assert_eq!(SERVER_EVENT_KINDS, &expected[..]);

    let from_enum: Vec<&str> = EventKind::ALL.iter().map(|kind| kind.as_str()).collect();
    assert_eq!(from_enum, expected);
}

#[test]
fn topic_id_fields_match_contract() {
    let contract = load_contract();
    let channel_field =
        contract["topic_id_fields"]["channel"].as_str().expect("channel field should be a string");
    let calendar_field = contract["topic_id_fields"]["calendar"]
        .as_str()
        .expect("calendar field should be a string");

    let join_channel = serde_json::to_value(ClientMessage::join(TopicKey::channel(5)))
        .expect("join should encode");
    assert_eq!(join_channel[channel_field], 5);

    let join_calendar = serde_json::to_value(ClientMessage::join(TopicKey::calendar(9)))
        .expect("join_calendar should encode");
    assert_eq!(join_calendar[calendar_field], 9);
}
