use shared::metrics_defs::{MetricDef, MetricType};

pub const NODE_FAILURES: MetricDef = MetricDef {
    name: "chat_router.node.failures",
    metric_type: MetricType::Counter,
    description: "Failed attempts against a single backend node during failover",
};

pub const EXECUTOR_EXHAUSTED: MetricDef = MetricDef {
    name: "chat_router.executor.exhausted",
    metric_type: MetricType::Counter,
    description: "Executions where no backend node succeeded",
};

pub const SESSIONS_CREATED: MetricDef = MetricDef {
    name: "chat_router.sessions.created",
    metric_type: MetricType::Counter,
    description: "Backend sessions created and pinned to a conversation",
};

pub const SESSIONS_INVALIDATED: MetricDef = MetricDef {
    name: "chat_router.sessions.invalidated",
    metric_type: MetricType::Counter,
    description: "Pinnings dropped after a failed completion",
};

pub const TURNS: MetricDef = MetricDef {
    name: "chat_router.turns",
    metric_type: MetricType::Counter,
    description: "Inbound messages handled. Tagged with outcome.",
};

pub const TURN_DURATION: MetricDef = MetricDef {
    name: "chat_router.turn.duration",
    metric_type: MetricType::Histogram,
    description: "Time from receiving a message to having an answer, in seconds",
};

pub const WEBHOOK_EVENTS: MetricDef = MetricDef {
    name: "chat_router.webhook.events",
    metric_type: MetricType::Counter,
    description: "Events received on the webhook. Tagged with kind.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    NODE_FAILURES,
    EXECUTOR_EXHAUSTED,
    SESSIONS_CREATED,
    SESSIONS_INVALIDATED,
    TURNS,
    TURN_DURATION,
    WEBHOOK_EVENTS,
];
