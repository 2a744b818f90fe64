//! Wire framing for transmissions.
//!
//! ```text
//! +-------------------+------------------+----------------------------+
//! | unique id u16 LE  | number u64 LE    | bincode payload            |
//! |                   | (0 = unstamped)  | (instigator, created, kind)|
//! +-------------------+------------------+----------------------------+
//! ```
//!
//! The unique id only selects the payload decoder. Retired ids decode to
//! `TransmissionKind::Retired` without looking at the payload; unknown ids
//! are rejected.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use takt_types::{
    is_retired, ErpImport, ImportSignal, ScenarioAction, ScenarioEdit, SystemSettingsAction,
    SystemStateSwitch, Transmission, TransmissionKind, UserAction, UserId, BATCH_ID,
    ERP_IMPORT_ID, IMPORT_SIGNAL_ID, SCENARIO_EDIT_ID, SCENARIO_ID, SYSTEM_SETTINGS_ID,
    SYSTEM_STATE_SWITCH_ID, USER_ID,
};

use crate::error::TransmissionError;

const HEADER_LEN: usize = 10;

#[derive(Serialize)]
struct PayloadRef<'a, P> {
    instigator: Option<UserId>,
    created: DateTime<Utc>,
    payload: &'a P,
}

#[derive(Deserialize)]
struct Payload<P> {
    instigator: Option<UserId>,
    created: DateTime<Utc>,
    payload: P,
}

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

fn encode_payload<P: Serialize>(t: &Transmission, payload: &P) -> Result<Vec<u8>, TransmissionError> {
    let body = PayloadRef {
        instigator: t.instigator,
        created: t.created,
        payload,
    };
    bincode::serde::encode_to_vec(&body, config())
        .map_err(|e| TransmissionError::Internal(format!("encode {}: {}", t.kind.name(), e)))
}

fn decode_payload<P: DeserializeOwned>(
    unique_id: u16,
    bytes: &[u8],
) -> Result<Payload<P>, TransmissionError> {
    let (payload, read) = bincode::serde::decode_from_slice::<Payload<P>, _>(bytes, config())
        .map_err(|e| TransmissionError::Decode {
            unique_id,
            message: e.to_string(),
        })?;
    if read != bytes.len() {
        return Err(TransmissionError::Decode {
            unique_id,
            message: format!("{} trailing bytes", bytes.len() - read),
        });
    }
    Ok(payload)
}

pub fn encode_frame(t: &Transmission) -> Result<Vec<u8>, TransmissionError> {
    let body = match &t.kind {
        TransmissionKind::Batch(members) => encode_payload(t, members)?,
        TransmissionKind::SystemSettings(a) => encode_payload(t, a)?,
        TransmissionKind::User(a) => encode_payload(t, a)?,
        TransmissionKind::Scenario(a) => encode_payload(t, a)?,
        TransmissionKind::ScenarioEdit(e) => encode_payload(t, e)?,
        TransmissionKind::ErpImport(i) => encode_payload(t, i)?,
        TransmissionKind::Import(s) => encode_payload(t, s)?,
        TransmissionKind::SystemStateSwitch(s) => encode_payload(t, s)?,
        TransmissionKind::Retired { unique_id } => {
            return Err(TransmissionError::Validation(format!(
                "retired transmission {} cannot be sent",
                unique_id
            )))
        }
    };

    let mut frame = vec![0u8; HEADER_LEN];
    LittleEndian::write_u16(&mut frame[0..2], t.unique_id());
    LittleEndian::write_u64(&mut frame[2..10], t.number.unwrap_or(0));
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn decode_frame(frame: &[u8]) -> Result<Transmission, TransmissionError> {
    if frame.len() < HEADER_LEN {
        return Err(TransmissionError::Validation(format!(
            "frame of {} bytes is shorter than its header",
            frame.len()
        )));
    }
    let unique_id = LittleEndian::read_u16(&frame[0..2]);
    let number = match LittleEndian::read_u64(&frame[2..10]) {
        0 => None,
        n => Some(n),
    };
    let body = &frame[HEADER_LEN..];

    fn wrap<P>(
        number: Option<u64>,
        p: Payload<P>,
        kind: impl FnOnce(P) -> TransmissionKind,
    ) -> Transmission {
        Transmission {
            number,
            instigator: p.instigator,
            created: p.created,
            kind: kind(p.payload),
        }
    }

    let t = match unique_id {
        BATCH_ID => wrap(number, decode_payload(unique_id, body)?, TransmissionKind::Batch),
        SYSTEM_SETTINGS_ID => wrap(
            number,
            decode_payload::<SystemSettingsAction>(unique_id, body)?,
            TransmissionKind::SystemSettings,
        ),
        USER_ID => wrap(
            number,
            decode_payload::<UserAction>(unique_id, body)?,
            TransmissionKind::User,
        ),
        SCENARIO_ID => wrap(
            number,
            decode_payload::<ScenarioAction>(unique_id, body)?,
            TransmissionKind::Scenario,
        ),
        SCENARIO_EDIT_ID => wrap(
            number,
            decode_payload::<ScenarioEdit>(unique_id, body)?,
            TransmissionKind::ScenarioEdit,
        ),
        ERP_IMPORT_ID => wrap(
            number,
            decode_payload::<ErpImport>(unique_id, body)?,
            TransmissionKind::ErpImport,
        ),
        IMPORT_SIGNAL_ID => wrap(
            number,
            decode_payload::<ImportSignal>(unique_id, body)?,
            TransmissionKind::Import,
        ),
        SYSTEM_STATE_SWITCH_ID => wrap(
            number,
            decode_payload::<SystemStateSwitch>(unique_id, body)?,
            TransmissionKind::SystemStateSwitch,
        ),
        id if is_retired(id) => Transmission {
            number,
            instigator: None,
            created: Utc::now(),
            kind: TransmissionKind::Retired { unique_id: id },
        },
        other => {
            log::error!(target: "dispatch", "no decoder registered for unique id {}", other);
            return Err(TransmissionError::UnknownTag(other));
        }
    };
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use takt_types::{DetailEdit, LicenseStatus, Plant, PlantId, ScenarioId, User, UserPermission};

    fn frame_for(unique_id: u16, number: u64, body: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; HEADER_LEN];
        LittleEndian::write_u16(&mut frame[0..2], unique_id);
        LittleEndian::write_u64(&mut frame[2..10], number);
        frame.extend_from_slice(body);
        frame
    }

    #[test]
    fn scenario_edit_survives_framing() {
        let t = Transmission::numbered(
            9,
            TransmissionKind::ScenarioEdit(ScenarioEdit {
                scenario: ScenarioId::new(1),
                edits: vec![DetailEdit::AddPlant(Plant::new(PlantId::new(3), "P3", "Third"))],
            }),
        )
        .with_instigator(UserId::new(4));
        let frame = encode_frame(&t).unwrap();
        assert_eq!(LittleEndian::read_u16(&frame[0..2]), SCENARIO_EDIT_ID);
        assert_eq!(decode_frame(&frame).unwrap(), t);
    }

    #[test]
    fn unstamped_number_is_zero_on_the_wire() {
        let t = Transmission::new(TransmissionKind::Batch(vec![
            TransmissionKind::User(UserAction::Add(User::new(
                UserId::new(1),
                "ana",
                UserPermission::Planner,
            ))),
            TransmissionKind::SystemStateSwitch(SystemStateSwitch {
                read_only: true,
                status: LicenseStatus::Expired,
                reason: "expired".into(),
            }),
        ]));
        let frame = encode_frame(&t).unwrap();
        assert_eq!(LittleEndian::read_u64(&frame[2..10]), 0);
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.number, None);
        assert_eq!(decoded.kind, t.kind);
    }

    #[test]
    fn retired_ids_decode_without_a_payload() {
        let decoded = decode_frame(&frame_for(33, 5, b"whatever was here")).unwrap();
        assert_eq!(decoded.kind, TransmissionKind::Retired { unique_id: 33 });
        assert_eq!(decoded.number, Some(5));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        assert!(matches!(
            decode_frame(&frame_for(999, 0, &[])),
            Err(TransmissionError::UnknownTag(999))
        ));
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        assert!(matches!(
            decode_frame(&frame_for(USER_ID, 0, &[0xff, 0xff, 0xff])),
            Err(TransmissionError::Decode { unique_id: USER_ID, .. })
        ));
        assert!(matches!(
            decode_frame(&[1, 0, 0]),
            Err(TransmissionError::Validation(_))
        ));
    }

    #[test]
    fn retired_kinds_cannot_be_encoded() {
        let t = Transmission::new(TransmissionKind::Retired { unique_id: 5 });
        assert!(encode_frame(&t).is_err());
    }
}
