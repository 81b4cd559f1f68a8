//! SQLite schema for the shop and the durable cache tier.

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
"#;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    growid TEXT PRIMARY KEY,
    balance_wl INTEGER NOT NULL DEFAULT 0,
    balance_dl INTEGER NOT NULL DEFAULT 0,
    balance_bgl INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS user_growid (
    discord_id TEXT PRIMARY KEY,
    growid TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (growid) REFERENCES users(growid) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_user_growid_growid ON user_growid(growid);

CREATE TABLE IF NOT EXISTS products (
    code TEXT PRIMARY KEY COLLATE NOCASE,
    name TEXT NOT NULL,
    price INTEGER NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS stock (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_code TEXT NOT NULL COLLATE NOCASE,
    content TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'available' CHECK (status IN ('available', 'sold', 'deleted')),
    added_by TEXT NOT NULL,
    buyer_id TEXT,
    added_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (product_code) REFERENCES products(code) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_stock_product_status ON stock(product_code, status);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    growid TEXT NOT NULL,
    type TEXT NOT NULL,
    details TEXT NOT NULL,
    old_balance TEXT,
    new_balance TEXT,
    items_count INTEGER NOT NULL DEFAULT 0,
    total_price INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (growid) REFERENCES users(growid) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_transactions_growid ON transactions(growid);

CREATE TABLE IF NOT EXISTS world_info (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    world TEXT NOT NULL,
    owner TEXT NOT NULL,
    bot TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS cache_table (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_cache_table_expires ON cache_table(expires_at);
"#;
