//! Camera control commands received on `<prefix>/camera/<id>/control`.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

#[derive(Deserialize)]
struct ControlMessage {
    action: ControlAction,
}

/// Extracts the camera id and action, or `None` if either is malformed.
pub fn parse_control<'a>(topic: &'a str, payload: &Value) -> Option<(&'a str, ControlAction)> {
    let mut levels = topic.rsplit('/');
    if levels.next()? != "control" {
        return None;
    }
    let camera_id = levels.next().filter(|id| !id.is_empty())?;
    if levels.next()? != "camera" {
        return None;
    }
    let message = ControlMessage::deserialize(payload).ok()?;
    Some((camera_id, message.action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_valid_commands() {
        assert_eq!(
            parse_control("fm/camera/cam1/control", &json!({"action": "restart"})),
            Some(("cam1", ControlAction::Restart))
        );
        assert_eq!(
            parse_control("fm/camera/gate/control", &json!({"action": "stop", "params": {}})),
            Some(("gate", ControlAction::Stop))
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(parse_control("fm/camera/cam1/control", &json!({"action": "explode"})), None);
        assert_eq!(parse_control("fm/camera/cam1/control", &json!({"raw": "start"})), None);
        assert_eq!(parse_control("fm/camera/cam1/status", &json!({"action": "start"})), None);
        assert_eq!(parse_control("fm/other/cam1/control", &json!({"action": "start"})), None);
    }
}
