//! iBeacon advertisement decoding
//! Turns raw manufacturer data from a BLE advertisement into beacon fields.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    APPLE_COMPANY_ID, IBEACON_FRAME_LEN, IBEACON_PAYLOAD_LEN, IBEACON_TYPE,
};
use crate::core::bluetooth::types::BeaconData;

/// Fields carried by an iBeacon manufacturer data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IBeaconFrame {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    /// Calibrated transmit power at 1 m
    pub reference_power: i8,
}

impl IBeaconFrame {
    /// Parses the manufacturer data of an advertisement.
    ///
    /// Layout after the company id: `02 15 <uuid:16> <major:2> <minor:2> <power:1>`,
    /// major and minor big-endian. Returns `None` for anything that is not an iBeacon.
    pub fn parse(company_id: u16, data: &[u8]) -> Option<Self> {
        if company_id != APPLE_COMPANY_ID || data.len() < IBEACON_FRAME_LEN {
            return None;
        }
        if data[0] != IBEACON_TYPE || data[1] != IBEACON_PAYLOAD_LEN {
            return None;
        }

        let uuid_bytes: [u8; 16] = data[2..18].try_into().ok()?;
        let major = u16::from_be_bytes([data[18], data[19]]);
        let minor = u16::from_be_bytes([data[20], data[21]]);
        let reference_power = data[22] as i8;

        Some(Self {
            uuid: Uuid::from_bytes(uuid_bytes),
            major,
            minor,
            reference_power,
        })
    }

    /// Combines the frame with the advertiser address and received power
    pub fn into_beacon_data(self, address: String, rx_power: i16) -> BeaconData {
        BeaconData {
            address,
            uuid: self.uuid.hyphenated().to_string().to_uppercase(),
            major: self.major,
            minor: self.minor,
            reference_power: self.reference_power as i16,
            rx_power,
        }
    }
}

/// Extracts the MAC address embedded in a platform device id.
/// BlueZ object paths (`dev_C4_4F_...`) and WinRT ids are both handled;
/// the result is colon-separated and uppercased.
pub fn extract_mac_address(device_id_str: &str) -> Option<String> {
    static MAC_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = MAC_RE
        .get_or_init(|| Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}([0-9A-Fa-f]{2})").ok())
        .as_ref()?;
    re.find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().replace(['_', '-'], ":").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ibeacon_payload() -> Vec<u8> {
        let mut data = vec![0x02, 0x15];
        data.extend_from_slice(&[
            0xe2, 0xc5, 0x6d, 0xb5, 0xdf, 0xfb, 0x48, 0xd2, 0xb0, 0x60, 0xd0, 0xf5, 0xa7, 0x10,
            0x96, 0xe0,
        ]);
        data.extend_from_slice(&[0x00, 0x01]); // major
        data.extend_from_slice(&[0x01, 0x02]); // minor
        data.push(0xc5); // -59 dBm
        data
    }

    #[test]
    fn parses_ibeacon_frame() {
        let frame = IBeaconFrame::parse(APPLE_COMPANY_ID, &ibeacon_payload()).unwrap();
        assert_eq!(frame.major, 1);
        assert_eq!(frame.minor, 258);
        assert_eq!(frame.reference_power, -59);

        let data = frame.into_beacon_data("AA:BB:CC:DD:EE:FF".to_string(), -70);
        assert_eq!(data.uuid, "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0");
        assert_eq!(data.reference_power, -59);
        assert_eq!(data.rx_power, -70);
    }

    #[test]
    fn ignores_other_vendors_and_short_frames() {
        assert!(IBeaconFrame::parse(0x0059, &ibeacon_payload()).is_none());
        assert!(IBeaconFrame::parse(APPLE_COMPANY_ID, &ibeacon_payload()[..10]).is_none());

        let mut not_ibeacon = ibeacon_payload();
        not_ibeacon[0] = 0x10;
        assert!(IBeaconFrame::parse(APPLE_COMPANY_ID, &not_ibeacon).is_none());
    }

    #[test]
    fn extracts_mac_from_device_id() {
        assert_eq!(
            extract_mac_address("BluetoothLE#BluetoothLE00:1a:7d:da:71:13-c4:4f:33:12:ab:cd"),
            Some("C4:4F:33:12:AB:CD".to_string())
        );
        assert_eq!(
            extract_mac_address("/org/bluez/hci0/dev_C4_4F_33_12_AB_CD"),
            Some("C4:4F:33:12:AB:CD".to_string())
        );
        assert_eq!(extract_mac_address("not-a-device"), None);
    }
}
