pub const SCHEMA: &str = r#"
-- users table (owned by the web application, read here for account email)
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- alerts table
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    strategy TEXT NOT NULL,
    prompt TEXT,
    wait TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    last_run TEXT,
    next_run TEXT,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_alerts_due ON alerts(active, next_run);

-- content table (URL-keyed extraction cache, shared across alerts)
CREATE TABLE IF NOT EXISTS content (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    normalized_url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    html_key TEXT NOT NULL,
    markdown_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- stories table
CREATE TABLE IF NOT EXISTS stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id INTEGER NOT NULL REFERENCES alerts(id),
    content_id INTEGER NOT NULL REFERENCES content(id),
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    key_findings TEXT NOT NULL DEFAULT '[]',
    user_marked_irrelevant INTEGER NOT NULL DEFAULT 0,
    system_marked_irrelevant INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    deleted_at TEXT,
    UNIQUE(alert_id, content_id)
);

CREATE INDEX IF NOT EXISTS idx_stories_alert_id ON stories(alert_id);

-- channels table
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    type TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    verified INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);

-- subscriptions table (channel_id is not a foreign key: dangling ids are
-- repaired by the custodian)
CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    alert_id INTEGER NOT NULL REFERENCES alerts(id),
    channel_id INTEGER,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_alert_id ON subscriptions(alert_id);
"#;
