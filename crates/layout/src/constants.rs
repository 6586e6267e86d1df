//! Protocol constants shared by every layout

// ============================================================================
// Group Dimensions
// ============================================================================

/// Number of token slots in a group (the last one is the shared quote token)
pub const MAX_TOKENS: usize = 16;

/// Number of market pairs; one per non-quote token
pub const MAX_PAIRS: usize = MAX_TOKENS - 1;

/// Index of the shared quote token in every token-indexed array
pub const QUOTE_INDEX: usize = MAX_TOKENS - 1;

/// Node banks a root bank can reference
pub const MAX_NODE_BANKS: usize = 8;

// ============================================================================
// Margin Account
// ============================================================================

/// Perp order slots carried inline by a margin account
pub const MAX_PERP_OPEN_ORDERS: usize = 64;

/// `order_market` value marking an unused perp order slot
pub const FREE_ORDER_SLOT: u8 = u8::MAX;

/// Length of the free-form info field
pub const INFO_LEN: usize = 32;

/// Metadata versions accepted for margin accounts (v1 accounts are closeable)
pub const MARGIN_ACCOUNT_VERSIONS: &[u8] = &[0, 1];

/// Metadata version for groups, root banks and perp markets
pub const PROTOCOL_VERSION: u8 = 0;

// ============================================================================
// Serum DEX
// ============================================================================

/// Every serum account starts with these five bytes
pub const SERUM_HEAD: &[u8; 5] = b"serum";

/// ...and ends with these seven
pub const SERUM_TAIL: &[u8; 7] = b"padding";

/// Order slots in a serum open-orders account
pub const SERUM_ORDER_SLOTS: usize = 128;

// ============================================================================
// Pyth Oracle
// ============================================================================

/// Magic number at the start of every pyth account
pub const PYTH_MAGIC: u32 = 0xA1B2_C3D4;

/// Supported pyth layout version
pub const PYTH_VERSION: u32 = 2;

/// Pyth account type for price accounts
pub const PYTH_PRICE_ACCOUNT_TYPE: u32 = 3;

/// Publisher component slots in a pyth price account
pub const PYTH_MAX_COMPONENTS: usize = 32;
