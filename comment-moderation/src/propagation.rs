use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use rdkafka::message::{Header, Headers, OwnedHeaders};
use tracing::{debug, warn};

pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Reads trace headers straight from the record, without copying them out first.
pub struct HeaderExtractor<'a> {
    headers: Option<&'a OwnedHeaders>,
}

impl<'a> HeaderExtractor<'a> {
    pub fn new(headers: Option<&'a OwnedHeaders>) -> Self {
        Self { headers }
    }
}

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers?
            .iter()
            .find(|header| header.key.eq_ignore_ascii_case(key))
            .and_then(|header| header.value)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    fn keys(&self) -> Vec<&str> {
        match self.headers {
            Some(headers) => headers.iter().map(|header| header.key).collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Default)]
struct HeaderInjector(Vec<(String, String)>);

impl Injector for HeaderInjector {
    fn set(&mut self, key: &str, value: String) {
        self.0.push((key.to_string(), value));
    }
}

/// Carries W3C trace context across Kafka, in `traceparent`/`tracestate` headers.
pub struct TraceBridge {
    propagator: TraceContextPropagator,
}

impl TraceBridge {
    pub fn new() -> Self {
        Self {
            propagator: TraceContextPropagator::new(),
        }
    }

    /// The remote parent carried by a record, if it has a usable one.
    pub fn extract(&self, headers: Option<&OwnedHeaders>) -> Option<Context> {
        let extractor = HeaderExtractor::new(headers);
        let Some(traceparent) = extractor.get(TRACEPARENT_HEADER) else {
            debug!("No trace context on record, starting a new trace");
            return None;
        };

        let cx = self.propagator.extract(&extractor);
        if !cx.span().span_context().is_valid() {
            warn!(traceparent, "Malformed trace context on record, starting a new trace");
            return None;
        }

        Some(cx)
    }

    /// Appends the trace headers for `cx`. Adds nothing when `cx` has no valid
    /// span, and leaves out `tracestate` when it is empty.
    pub fn inject(&self, cx: &Context, headers: OwnedHeaders) -> OwnedHeaders {
        let mut injector = HeaderInjector::default();
        self.propagator.inject_context(cx, &mut injector);

        injector
            .0
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .fold(headers, |headers, (key, value)| {
                headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_bytes()),
                })
            })
    }
}

impl Default for TraceBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";

    fn remote_context() -> Context {
        let span_context = SpanContext::new(
            TraceId::from_hex(TRACE_ID).unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    fn traceparent(value: &str) -> OwnedHeaders {
        OwnedHeaders::new().insert(Header {
            key: TRACEPARENT_HEADER,
            value: Some(value),
        })
    }

    #[test]
    fn test_inject_then_extract_keeps_trace_id() {
        let bridge = TraceBridge::new();

        let headers = bridge.inject(&remote_context(), OwnedHeaders::new());
        let extracted = bridge.extract(Some(&headers)).unwrap();

        assert_eq!(
            extracted.span().span_context().trace_id(),
            TraceId::from_hex(TRACE_ID).unwrap()
        );
        assert!(extracted.span().span_context().is_remote());
    }

    #[test]
    fn test_inject_keeps_existing_headers() {
        let bridge = TraceBridge::new();
        let existing = OwnedHeaders::new().insert(Header {
            key: "source",
            value: Some("api"),
        });

        let headers = bridge.inject(&remote_context(), existing);

        let keys: Vec<&str> = headers.iter().map(|h| h.key).collect();
        assert_eq!(keys[0], "source");
        assert!(keys.contains(&TRACEPARENT_HEADER));
    }

    #[test]
    fn test_empty_trace_state_is_not_injected() {
        let bridge = TraceBridge::new();

        let headers = bridge.inject(&remote_context(), OwnedHeaders::new());

        let keys: Vec<&str> = headers.iter().map(|h| h.key).collect();
        assert_eq!(keys, vec![TRACEPARENT_HEADER]);
    }

    #[test]
    fn test_non_empty_trace_state_is_injected() {
        let bridge = TraceBridge::new();
        let span_context = SpanContext::new(
            TraceId::from_hex(TRACE_ID).unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::from_key_value([("vendor", "value")]).unwrap(),
        );
        let cx = Context::new().with_remote_span_context(span_context);

        let headers = bridge.inject(&cx, OwnedHeaders::new());

        let tracestate = headers
            .iter()
            .find(|h| h.key == "tracestate")
            .and_then(|h| h.value)
            .unwrap();
        assert_eq!(tracestate, b"vendor=value");
    }

    #[test]
    fn test_inject_without_span_adds_nothing() {
        let bridge = TraceBridge::new();

        let headers = bridge.inject(&Context::new(), OwnedHeaders::new());

        assert_eq!(headers.count(), 0);
    }

    #[test]
    fn test_missing_headers_yield_no_parent() {
        let bridge = TraceBridge::new();

        assert!(bridge.extract(None).is_none());
        assert!(bridge.extract(Some(&OwnedHeaders::new())).is_none());
    }

    #[test]
    fn test_malformed_traceparent_yields_no_parent() {
        let bridge = TraceBridge::new();

        assert!(bridge.extract(Some(&traceparent("not-a-trace"))).is_none());
        assert!(bridge
            .extract(Some(&traceparent(
                "00-00000000000000000000000000000000-00f067aa0ba902b7-01"
            )))
            .is_none());
    }

    #[test]
    fn test_extractor_matches_keys_case_insensitively() {
        let headers = OwnedHeaders::new().insert(Header {
            key: "TraceParent",
            value: Some("value"),
        });
        let extractor = HeaderExtractor::new(Some(&headers));

        assert_eq!(extractor.get(TRACEPARENT_HEADER), Some("value"));
        assert_eq!(extractor.keys(), vec!["TraceParent"]);
    }
}
