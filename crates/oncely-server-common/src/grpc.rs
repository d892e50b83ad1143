// RPC envelope messages
// Field tags follow the payload envelope used by the bi-directional request
// stream, so handlers can be mounted behind an existing gRPC service

use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metadata {
    #[prost(string, tag = "3")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(string, tag = "8")]
    pub client_ip: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "7")]
    pub headers: HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Payload {
    #[prost(message, optional, tag = "2")]
    pub metadata: ::core::option::Option<Metadata>,
    #[prost(message, optional, tag = "3")]
    pub body: ::core::option::Option<::prost_types::Any>,
}

impl Payload {
    /// Build a payload whose body carries `value` tagged with `type_url`
    pub fn typed(r#type: &str, type_url: &str, value: Vec<u8>) -> Self {
        Self {
            metadata: Some(Metadata {
                r#type: r#type.to_string(),
                ..Default::default()
            }),
            body: Some(::prost_types::Any {
                type_url: type_url.to_string(),
                value,
            }),
        }
    }

    pub fn message_type(&self) -> &str {
        self.metadata.as_ref().map(|m| m.r#type.as_str()).unwrap_or_default()
    }

    /// Header lookup, ignoring ASCII case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| {
            m.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }

    /// Whether the body names the message type it carries
    pub fn has_typed_body(&self) -> bool {
        self.body.as_ref().is_some_and(|b| !b.type_url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut payload = Payload::typed("CreateOrderRequest", "type.googleapis.com/Order", vec![]);
        if let Some(metadata) = payload.metadata.as_mut() {
            metadata
                .headers
                .insert("Idempotency-Key".to_string(), "k-1".to_string());
        }

        assert_eq!(payload.header("idempotency-key"), Some("k-1"));
        assert_eq!(payload.header("missing"), None);
        assert_eq!(payload.message_type(), "CreateOrderRequest");
    }

    #[test]
    fn test_typed_body_detection() {
        assert!(Payload::typed("T", "type.googleapis.com/T", vec![1]).has_typed_body());
        assert!(!Payload::typed("T", "", vec![1]).has_typed_body());
        assert!(!Payload::default().has_typed_body());
    }

    #[test]
    fn test_wire_encoding_is_stable() {
        let payload = Payload::typed("T", "u", vec![7]);
        let decoded = Payload::decode(payload.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, payload);
    }
}
