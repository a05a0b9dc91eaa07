use biometrics::{Collector, Counter, Moments};

pub(crate) static TEXT_REQUESTS: Counter = Counter::new("duochat.text.requests");
pub(crate) static TEXT_ERRORS: Counter = Counter::new("duochat.text.errors");
pub(crate) static TEXT_TIMEOUTS: Counter = Counter::new("duochat.text.timeouts");
pub(crate) static TEXT_BYTES: Counter = Counter::new("duochat.text.bytes");
pub(crate) static TEXT_TTFB: Moments = Moments::new("duochat.text.ttfb_seconds");
pub(crate) static TEXT_DURATION: Moments = Moments::new("duochat.text.duration_seconds");

pub(crate) static IMAGE_REQUESTS: Counter = Counter::new("duochat.image.requests");
pub(crate) static IMAGE_ERRORS: Counter = Counter::new("duochat.image.errors");
pub(crate) static IMAGE_BYTES: Counter = Counter::new("duochat.image.bytes");
pub(crate) static IMAGE_DURATION: Moments = Moments::new("duochat.image.duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&TEXT_REQUESTS);
    collector.register_counter(&TEXT_ERRORS);
    collector.register_counter(&TEXT_TIMEOUTS);
    collector.register_counter(&TEXT_BYTES);
    collector.register_moments(&TEXT_TTFB);
    collector.register_moments(&TEXT_DURATION);

    collector.register_counter(&IMAGE_REQUESTS);
    collector.register_counter(&IMAGE_ERRORS);
    collector.register_counter(&IMAGE_BYTES);
    collector.register_moments(&IMAGE_DURATION);
}
