use crate::SharedIndex;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Debug)]
struct Instrumented(SharedIndex);

pub fn register(reg: &mut Registry, index: SharedIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let this = self.0.read();

        let mut exceptions_encoder = encoder.encode_descriptor(
            "policy_exception_index_size",
            "The number of policy exceptions in index",
            None,
            MetricType::Gauge,
        )?;
        for (ns, count) in this.exceptions_by_namespace() {
            let labels = [("namespace", ns)];
            let exceptions = ConstGauge::new(count as u32);
            let exceptions_encoder = exceptions_encoder.encode_family(&labels)?;
            exceptions.encode(exceptions_encoder)?;
        }

        let policies_encoder = encoder.encode_descriptor(
            "policy_exception_indexed_policies",
            "The number of policies referenced by indexed policy exceptions",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(this.policy_count() as u32).encode(policies_encoder)?;

        let synced_encoder = encoder.encode_descriptor(
            "policy_exception_index_synced",
            "Whether the policy exception index has observed a complete listing",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(this.is_synced() as u32).encode(synced_encoder)?;

        Ok(())
    }
}
