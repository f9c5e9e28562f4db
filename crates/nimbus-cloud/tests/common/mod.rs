use async_trait::async_trait;
use nimbus_cloud::{
    AddressPair, Credentials, Image, ImageSpec, Node, NodeSpec, NodeStatus, PollBudget,
    Preparation, ProviderAdapter, ProviderError, RateLimits, RegionContext, Reply,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Region with a short poll budget and no settle delay
pub fn test_region(per_minute: u32) -> RegionContext {
    RegionContext::new("mock", "test-1", Credentials::new("AKID", "secret"))
        .with_limits(RateLimits::per_minute(per_minute))
        .with_node_poll(PollBudget::new(5, 1_000))
        .with_delete_poll(PollBudget::new(5, 1_000))
        .with_image_poll(PollBudget::new(5, 1_000))
        .with_settle_delay_ms(0)
}

pub fn node(id: &str, status: &str) -> Node {
    Node::new(id, status.parse::<NodeStatus>().unwrap())
}

/// Scripted provider
///
/// Listings are consumed one per call; the last one keeps being returned.
pub struct MockProvider {
    started: Instant,
    calls: Mutex<Vec<(String, Duration)>>,
    create_replies: Mutex<HashMap<usize, Reply<Node>>>,
    node_listings: Mutex<VecDeque<Result<Vec<Node>, ProviderError>>>,
    image_listings: Mutex<VecDeque<Result<Vec<Image>, ProviderError>>>,
    delete_errors: Mutex<HashMap<String, ProviderError>>,
    allocate_failures: Mutex<Vec<usize>>,
    create_image_reply: Mutex<Option<Reply<Option<String>>>>,
    prepare_error: Mutex<Option<ProviderError>>,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            calls: Mutex::new(Vec::new()),
            create_replies: Mutex::new(HashMap::new()),
            node_listings: Mutex::new(VecDeque::new()),
            image_listings: Mutex::new(VecDeque::new()),
            delete_errors: Mutex::new(HashMap::new()),
            allocate_failures: Mutex::new(Vec::new()),
            create_image_reply: Mutex::new(None),
            prepare_error: Mutex::new(None),
        }
    }

    pub fn with_create_reply(self, index: usize, reply: Reply<Node>) -> Self {
        self.create_replies.lock().unwrap().insert(index, reply);
        self
    }

    pub fn with_node_listing(self, nodes: Vec<Node>) -> Self {
        self.node_listings.lock().unwrap().push_back(Ok(nodes));
        self
    }

    pub fn with_node_listing_error(self, error: ProviderError) -> Self {
        self.node_listings.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_image_listing(self, images: Vec<Image>) -> Self {
        self.image_listings.lock().unwrap().push_back(Ok(images));
        self
    }

    pub fn with_image_listing_error(self, error: ProviderError) -> Self {
        self.image_listings.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_delete_error(self, id: &str, error: ProviderError) -> Self {
        self.delete_errors
            .lock()
            .unwrap()
            .insert(id.to_string(), error);
        self
    }

    pub fn with_allocate_failure(self, call: usize) -> Self {
        self.allocate_failures.lock().unwrap().push(call);
        self
    }

    pub fn with_create_image_reply(self, reply: Reply<Option<String>>) -> Self {
        *self.create_image_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_prepare_error(self, error: ProviderError) -> Self {
        *self.prepare_error.lock().unwrap() = Some(error);
        self
    }

    fn record(&self, op: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), self.started.elapsed()));
    }

    /// Offsets (from mock creation) at which `op` was called
    pub fn call_times(&self, op: &str) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == op)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.call_times(op).len()
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<Result<T, ProviderError>>>, empty: T) -> Result<T, ProviderError> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(Ok(empty))
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn prepare(&self, _region: &RegionContext) -> Result<Preparation, ProviderError> {
        self.record("prepare");
        match self.prepare_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(Preparation(serde_json::json!({"group": "mock-sg"}))),
        }
    }

    async fn create_node(
        &self,
        _region: &RegionContext,
        _spec: &NodeSpec,
        preparation: &Preparation,
        index: usize,
    ) -> Reply<Node> {
        self.record("create_node");
        assert_eq!(preparation.0["group"], "mock-sg");
        match self.create_replies.lock().unwrap().remove(&index) {
            Some(reply) => reply,
            None => Reply::ok(Node::new(format!("i-{}", index), NodeStatus::Pending))
                .with_raw(serde_json::json!({"instanceIndex": index})),
        }
    }

    async fn delete_node(&self, _region: &RegionContext, node: &Node) -> Reply<()> {
        self.record("delete_node");
        match self.delete_errors.lock().unwrap().get(&node.id) {
            Some(error) => Reply::err(error.clone()),
            None => Reply::ok(()),
        }
    }

    async fn list_nodes(&self, _region: &RegionContext) -> Result<Vec<Node>, ProviderError> {
        self.record("list_nodes");
        Self::next(&self.node_listings, Vec::new())
    }

    async fn create_image(
        &self,
        _region: &RegionContext,
        _spec: &ImageSpec,
    ) -> Reply<Option<String>> {
        self.record("create_image");
        self.create_image_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Reply::ok(Some("ami-1".to_string())))
    }

    async fn list_images(&self, _region: &RegionContext) -> Result<Vec<Image>, ProviderError> {
        self.record("list_images");
        Self::next(&self.image_listings, Vec::new())
    }

    async fn delete_image(&self, _region: &RegionContext, _image_id: &str) -> Reply<()> {
        self.record("delete_image");
        Reply::ok(())
    }

    async fn associate_address(&self, _region: &RegionContext, _pair: &AddressPair) -> Reply<()> {
        self.record("associate_address");
        Reply::ok(())
    }

    async fn disassociate_address(&self, _region: &RegionContext, _public_ip: &str) -> Reply<()> {
        self.record("disassociate_address");
        Reply::ok(())
    }

    async fn allocate_address(&self, _region: &RegionContext) -> Reply<Option<String>> {
        self.record("allocate_address");
        let call = self.call_count("allocate_address") - 1;
        if self.allocate_failures.lock().unwrap().contains(&call) {
            Reply::ok(None)
        } else {
            Reply::ok(Some(format!("203.0.113.{}", call + 1)))
        }
    }
}
