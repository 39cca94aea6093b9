//! Parsing tests for the lock vendor's reply formats

#[cfg(test)]
mod tests {
    use rodada_server::iot::protocol::{
        parse_lock_state, parse_unlock_reply, InstructionReply, LockState, TokenReply, UnlockReply,
    };

    fn reply(code: i64, result: Option<&str>) -> InstructionReply {
        InstructionReply {
            code,
            message: None,
            result: result.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_unlock_confirmed_on_open_set_ok() {
        let r = reply(0, Some("OPEN set OK!"));
        assert_eq!(parse_unlock_reply(&r), UnlockReply::Confirmed);
    }

    #[test]
    fn test_unlock_already_open_is_not_confirmed() {
        let r = reply(
            0,
            Some("OPEN command is not executed, the lock is already open"),
        );
        assert_eq!(parse_unlock_reply(&r), UnlockReply::AlreadyUnlocked);
    }

    #[test]
    fn test_unlock_unrecognized_text_is_not_confirmed() {
        let r = reply(0, Some("Device offline"));
        assert_eq!(parse_unlock_reply(&r), UnlockReply::NotConfirmed);
    }

    #[test]
    fn test_unlock_error_code_is_not_confirmed() {
        let r = reply(1004, Some("OPEN set OK!"));
        assert_eq!(parse_unlock_reply(&r), UnlockReply::NotConfirmed);
    }

    #[test]
    fn test_unlock_missing_result_is_not_confirmed() {
        let r = reply(0, None);
        assert_eq!(parse_unlock_reply(&r), UnlockReply::NotConfirmed);
    }

    #[test]
    fn test_status_reports_locked() {
        let r = reply(
            0,
            Some("STATUS#:Battery:80%;Lock state;GSM Signal:Strong;"),
        );
        assert_eq!(parse_lock_state(&r), LockState::Locked);
    }

    #[test]
    fn test_status_reports_unlocked() {
        let r = reply(
            0,
            Some("STATUS#:Battery:80%;Unlock state;GSM Signal:Strong;"),
        );
        assert_eq!(parse_lock_state(&r), LockState::Unlocked);
    }

    #[test]
    fn test_unlock_marker_never_reads_as_locked() {
        // "unlock state" contains the letters of "lock state"; only the
        // word-bounded marker may count.
        let r = reply(0, Some("unlock state;"));
        assert_eq!(parse_lock_state(&r), LockState::Unlocked);
    }

    #[test]
    fn test_status_matching_ignores_case() {
        let r = reply(0, Some("LOCK STATE;Voltage:3.9V;"));
        assert_eq!(parse_lock_state(&r), LockState::Locked);
    }

    #[test]
    fn test_status_with_both_markers_is_unknown() {
        let r = reply(0, Some("Lock state;Unlock state;"));
        assert_eq!(parse_lock_state(&r), LockState::Unknown);
    }

    #[test]
    fn test_status_with_no_marker_is_unknown() {
        let r = reply(0, Some("Battery:80%;GSM Signal:Strong;"));
        assert_eq!(parse_lock_state(&r), LockState::Unknown);
    }

    #[test]
    fn test_status_error_code_is_unknown() {
        let r = reply(900, Some("Lock state;"));
        assert_eq!(parse_lock_state(&r), LockState::Unknown);
    }

    #[test]
    fn test_status_missing_result_is_unknown() {
        let r = reply(0, None);
        assert_eq!(parse_lock_state(&r), LockState::Unknown);
    }

    #[test]
    fn test_instruction_reply_deserializes_vendor_json() {
        let raw = r#"{"code":0,"message":"success","result":"OPEN set OK!","requestId":"abc-123"}"#;
        let r: InstructionReply = serde_json::from_str(raw).unwrap();
        assert_eq!(r.code, 0);
        assert_eq!(parse_unlock_reply(&r), UnlockReply::Confirmed);
    }

    #[test]
    fn test_token_reply_deserializes_camel_case_grant() {
        let raw = r#"{"code":0,"result":{"accessToken":"at-1","refreshToken":"rt-1","expiresIn":7200,"account":"ops"}}"#;
        let r: TokenReply = serde_json::from_str(raw).unwrap();
        let grant = r.result.unwrap();
        assert_eq!(grant.access_token, "at-1");
        assert_eq!(grant.refresh_token, "rt-1");
        assert_eq!(grant.expires_in, Some(7200));
    }

    #[test]
    fn test_token_reply_tolerates_missing_result() {
        let raw = r#"{"code":1001,"message":"Invalid signature"}"#;
        let r: TokenReply = serde_json::from_str(raw).unwrap();
        assert_eq!(r.code, 1001);
        assert!(r.result.is_none());
    }
}
