use legato_infra_midi_midir::parse_message;
use legato_ports::midi::{MidiLikeEvent, RawMidiMessage};
use pretty_assertions::assert_eq;

#[test]
fn keeps_channel_voice_messages() {
    assert_eq!(
        parse_message(&[0x91, 60, 100]),
        Some(RawMidiMessage::new(0x91, 60, 100))
    );
    assert_eq!(
        parse_message(&[0xB0, 64, 127]).and_then(|m| m.to_event()),
        Some(MidiLikeEvent::Cc64 { value: 127 })
    );
}

#[test]
fn drops_system_and_empty_messages() {
    assert_eq!(parse_message(&[]), None);
    assert_eq!(parse_message(&[0xF8]), None);
    assert_eq!(parse_message(&[0xF0, 0x7E, 0x7F, 0xF7]), None);
    assert_eq!(parse_message(&[0x40, 0x10]), None);
}

#[test]
fn short_messages_are_zero_padded() {
    assert_eq!(
        parse_message(&[0xC0, 5]),
        Some(RawMidiMessage::new(0xC0, 5, 0))
    );
}
