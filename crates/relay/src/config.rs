use netpose::LinkSpec;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub max_clients: usize,
    pub tick_rate: u32,
    pub timeout_secs: u64,
    pub conditioner: Option<LinkSpec>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            tick_rate: 60,
            timeout_secs: 10,
            conditioner: None,
        }
    }
}
