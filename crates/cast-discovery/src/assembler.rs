//! Turn the records of one mDNS response into device descriptors.

use crate::dns::{names_equal, RecordData, ResourceRecord};
use cast_core::{DeviceDescriptor, DEFAULT_CONTROL_PORT};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, trace};

/// Builds descriptors by joining PTR → SRV → TXT/A/AAAA within a response.
pub struct DeviceAssembler;

impl DeviceAssembler {
    /// Assemble every instance of `service` advertised in `records`.
    ///
    /// Instances without an SRV record in the same response are skipped.
    pub fn assemble(records: &[ResourceRecord], service: &str) -> Vec<DeviceDescriptor> {
        let mut devices = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for record in records {
            let instance = match &record.data {
                RecordData::Ptr(target) if names_equal(&record.name, service) => target.as_str(),
                _ => continue,
            };
            if seen.iter().any(|s| names_equal(s, instance)) {
                continue;
            }
            seen.push(instance);

            match Self::assemble_instance(records, instance, service) {
                Some(device) => {
                    trace!("Assembled {} at {}:{}", device.id, device.host, device.port);
                    devices.push(device);
                }
                None => debug!("No SRV record for {}, skipping", instance),
            }
        }

        devices
    }

    fn assemble_instance(
        records: &[ResourceRecord],
        instance: &str,
        service: &str,
    ) -> Option<DeviceDescriptor> {
        let (port, target) = records.iter().find_map(|r| match &r.data {
            RecordData::Srv { port, target, .. } if names_equal(&r.name, instance) => {
                Some((*port, target.as_str()))
            }
            _ => None,
        })?;

        let mut attributes = HashMap::new();
        for record in records.iter().filter(|r| names_equal(&r.name, instance)) {
            if let RecordData::Txt(entries) = &record.data {
                for (key, value) in entries {
                    attributes.insert(key.clone(), value.clone());
                }
            }
        }

        // IPv4 first, then IPv6, each in record order
        let host_records: Vec<&ResourceRecord> = records
            .iter()
            .filter(|r| names_equal(&r.name, target))
            .collect();
        let v4 = host_records.iter().filter_map(|r| match r.data {
            RecordData::A(v4) => Some(IpAddr::V4(v4)),
            _ => None,
        });
        let v6 = host_records.iter().filter_map(|r| match r.data {
            RecordData::Aaaa(v6) => Some(IpAddr::V6(v6)),
            _ => None,
        });
        let mut addresses: Vec<IpAddr> = Vec::new();
        for addr in v4.chain(v6) {
            if !addresses.contains(&addr) {
                addresses.push(addr);
            }
        }

        let instance_name = instance.trim_end_matches('.');
        let label = instance_label(instance, service);

        let id = non_empty(attributes.get("id"))
            .unwrap_or(instance_name)
            .to_string();
        let name = non_empty(attributes.get("fn")).unwrap_or(label).to_string();

        Some(DeviceDescriptor {
            id,
            name,
            host: target.trim_end_matches('.').to_string(),
            port: if port == 0 { DEFAULT_CONTROL_PORT } else { port },
            addresses,
            attributes,
        })
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// Instance name with the service suffix removed.
fn instance_label<'a>(instance: &'a str, service: &str) -> &'a str {
    let instance = instance.trim_end_matches('.');
    let suffix = format!(".{}", service.trim_end_matches('.'));
    if instance.len() > suffix.len() {
        let split = instance.len() - suffix.len();
        if instance.is_char_boundary(split) && instance[split..].eq_ignore_ascii_case(&suffix) {
            return &instance[..split];
        }
    }
    instance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::parse_response;
    use crate::dns::testing::ResponseBuilder;
    use crate::SERVICE_NAME;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const INSTANCE: &str = "Chromecast-1234._googlecast._tcp.local.";

    fn assemble(packet: &[u8]) -> Vec<DeviceDescriptor> {
        DeviceAssembler::assemble(&parse_response(packet).unwrap(), SERVICE_NAME)
    }

    #[test]
    fn full_response_yields_one_device() {
        let packet = ResponseBuilder::new()
            .ptr(SERVICE_NAME, INSTANCE)
            .srv(INSTANCE, 8009, "abc.local.")
            .txt(INSTANCE, &["id=abc", "fn=Living Room", "md=Chromecast"])
            .a("abc.local.", Ipv4Addr::new(192, 168, 1, 7))
            .build();

        let devices = assemble(&packet);
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.id, "abc");
        assert_eq!(device.name, "Living Room");
        assert_eq!(device.host, "abc.local");
        assert_eq!(device.port, 8009);
        assert_eq!(device.address_literals(), vec!["192.168.1.7".to_string()]);
        assert_eq!(device.model(), Some("Chromecast"));
    }

    #[test]
    fn missing_srv_is_skipped() {
        let packet = ResponseBuilder::new()
            .ptr(SERVICE_NAME, INSTANCE)
            .txt(INSTANCE, &["id=abc"])
            .build();
        assert!(assemble(&packet).is_empty());
    }

    #[test]
    fn falls_back_to_instance_name() {
        let packet = ResponseBuilder::new()
            .ptr(SERVICE_NAME, INSTANCE)
            .srv(INSTANCE, 8009, "abc.local.")
            .txt(INSTANCE, &["id=", "md=Chromecast"])
            .build();

        let device = &assemble(&packet)[0];
        assert_eq!(device.id, "Chromecast-1234._googlecast._tcp.local");
        assert_eq!(device.name, "Chromecast-1234");
        assert!(device.addresses.is_empty());
        assert_eq!(device.connect_host(), "abc.local");
    }

    #[test]
    fn zero_port_defaults_to_control_port() {
        let packet = ResponseBuilder::new()
            .ptr(SERVICE_NAME, INSTANCE)
            .srv(INSTANCE, 0, "abc.local.")
            .build();
        assert_eq!(assemble(&packet)[0].port, DEFAULT_CONTROL_PORT);
    }

    #[test]
    fn addresses_are_deduplicated_in_order() {
        let v6 = Ipv6Addr::new(0xfe80, 0, 0, 0, 0x1, 0, 0, 0x7);
        let packet = ResponseBuilder::new()
            .ptr(SERVICE_NAME, INSTANCE)
            .srv(INSTANCE, 8009, "abc.local.")
            .a("abc.local.", Ipv4Addr::new(10, 0, 0, 2))
            .aaaa("ABC.local.", v6)
            .a("abc.local.", Ipv4Addr::new(10, 0, 0, 2))
            .a("other.local.", Ipv4Addr::new(10, 0, 0, 9))
            .build();

        let device = &assemble(&packet)[0];
        assert_eq!(
            device.address_literals(),
            vec!["10.0.0.2".to_string(), "fe80:0:0:0:1:0:0:7".to_string()]
        );
    }

    #[test]
    fn ipv4_addresses_come_before_ipv6() {
        let packet = ResponseBuilder::new()
            .ptr(SERVICE_NAME, INSTANCE)
            .srv(INSTANCE, 8009, "abc.local.")
            .aaaa("abc.local.", Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))
            .a("abc.local.", Ipv4Addr::new(192, 168, 1, 7))
            .build();

        let device = &assemble(&packet)[0];
        assert_eq!(device.addresses[0], IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)));
        assert_eq!(device.addresses.len(), 2);
        assert_eq!(device.connect_host(), "192.168.1.7");
    }

    #[test]
    fn other_services_are_ignored() {
        let packet = ResponseBuilder::new()
            .ptr("_spotify-connect._tcp.local.", "tv._spotify-connect._tcp.local.")
            .srv("tv._spotify-connect._tcp.local.", 7000, "tv.local.")
            .build();
        assert!(assemble(&packet).is_empty());
    }

    #[test]
    fn duplicate_ptr_yields_one_device() {
        let packet = ResponseBuilder::new()
            .ptr(SERVICE_NAME, INSTANCE)
            .ptr(SERVICE_NAME, INSTANCE)
            .srv(INSTANCE, 8009, "abc.local.")
            .build();
        assert_eq!(assemble(&packet).len(), 1);
    }

    #[test]
    fn instance_label_strips_service() {
        assert_eq!(instance_label(INSTANCE, SERVICE_NAME), "Chromecast-1234");
        assert_eq!(instance_label("plain.local.", SERVICE_NAME), "plain.local");
    }
}
