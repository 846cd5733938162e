//! Binary feed decoder for a NASDAQ ITCH 5.0-style stream.
//!
//! Messages arrive as a concatenated sequence with no session framing.
//! Every message starts with a one-byte type tag followed by a fixed
//! big-endian layout; the first 11 bytes are a common header. Prices on
//! the wire are unsigned 32-bit in 1/10000 units; symbols are 8-byte
//! blank-padded ASCII; timestamps are 48-bit nanoseconds since midnight.
//!
//! The parser is stateless apart from its counters. Decoded messages
//! dispatch through [`MessageHandler`], one method per message kind,
//! all defaulting to no-ops.

use crate::types::Side;

#[inline]
fn be_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
fn be_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[inline]
fn be_u48(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[2..8].copy_from_slice(&buf[offset..offset + 6]);
    u64::from_be_bytes(bytes)
}

#[inline]
fn be_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}

#[inline]
fn read_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

/// 'B' on the wire is buy, 'S' is sell.
#[inline]
fn wire_side(byte: u8) -> Side {
    if byte == b'S' {
        Side::Sell
    } else {
        Side::Buy
    }
}

/// Trim the trailing blank padding from an 8-byte symbol field.
pub fn symbol_str(stock: &[u8; 8]) -> &str {
    std::str::from_utf8(stock)
        .unwrap_or("")
        .trim_end_matches(' ')
}

/// Message type tags, one byte on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    SystemEvent = b'S',
    StockDirectory = b'R',
    StockTradingAction = b'H',
    RegSho = b'Y',
    MarketParticipantPosition = b'L',
    MwcbDeclineLevel = b'V',
    MwcbStatus = b'W',
    IpoQuotingPeriod = b'K',
    LuldAuctionCollar = b'J',
    OperationalHalt = b'h',
    AddOrder = b'A',
    AddOrderMpid = b'F',
    OrderExecuted = b'E',
    OrderExecutedWithPrice = b'C',
    OrderCancel = b'X',
    OrderDelete = b'D',
    OrderReplace = b'U',
    Trade = b'P',
    CrossTrade = b'Q',
    BrokenTrade = b'B',
    Noii = b'I',
    Rpii = b'N',
}

impl MessageKind {
    /// Map a wire tag to a kind; `None` for unknown tags.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            b'S' => Self::SystemEvent,
            b'R' => Self::StockDirectory,
            b'H' => Self::StockTradingAction,
            b'Y' => Self::RegSho,
            b'L' => Self::MarketParticipantPosition,
            b'V' => Self::MwcbDeclineLevel,
            b'W' => Self::MwcbStatus,
            b'K' => Self::IpoQuotingPeriod,
            b'J' => Self::LuldAuctionCollar,
            b'h' => Self::OperationalHalt,
            b'A' => Self::AddOrder,
            b'F' => Self::AddOrderMpid,
            b'E' => Self::OrderExecuted,
            b'C' => Self::OrderExecutedWithPrice,
            b'X' => Self::OrderCancel,
            b'D' => Self::OrderDelete,
            b'U' => Self::OrderReplace,
            b'P' => Self::Trade,
            b'Q' => Self::CrossTrade,
            b'B' => Self::BrokenTrade,
            b'I' => Self::Noii,
            b'N' => Self::Rpii,
            _ => return None,
        })
    }

    /// Exact wire length of this message kind, header included.
    pub const fn wire_length(self) -> usize {
        match self {
            Self::SystemEvent => 12,
            Self::StockDirectory => 39,
            Self::StockTradingAction => 25,
            Self::RegSho => 20,
            Self::MarketParticipantPosition => 26,
            Self::MwcbDeclineLevel => 35,
            Self::MwcbStatus => 12,
            Self::IpoQuotingPeriod => 28,
            Self::LuldAuctionCollar => 35,
            Self::OperationalHalt => 21,
            Self::AddOrder => 36,
            Self::AddOrderMpid => 40,
            Self::OrderExecuted => 31,
            Self::OrderExecutedWithPrice => 36,
            Self::OrderCancel => 23,
            Self::OrderDelete => 19,
            Self::OrderReplace => 35,
            Self::Trade => 44,
            Self::CrossTrade => 40,
            Self::BrokenTrade => 19,
            Self::Noii => 50,
            Self::Rpii => 20,
        }
    }
}

/// Common 11-byte message header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: MessageKind,
    pub stock_locate: u16,
    pub tracking_number: u16,
    /// 48-bit nanoseconds since midnight, widened to 64
    pub timestamp: u64,
}

// ============================================================================
// Decoded messages
// ============================================================================

/// 'S' - System Event
#[derive(Clone, Copy, Debug)]
pub struct SystemEvent {
    pub header: MessageHeader,
    /// 'O' start, 'S' start hours, 'Q' start market, 'M' end market,
    /// 'E' end hours, 'C' end
    pub event_code: u8,
}

/// 'R' - Stock Directory
#[derive(Clone, Copy, Debug)]
pub struct StockDirectory {
    pub header: MessageHeader,
    pub stock: [u8; 8],
    pub market_category: u8,
    pub financial_status: u8,
    pub round_lot_size: u32,
    pub round_lots_only: u8,
    pub issue_classification: u8,
    pub issue_subtype: [u8; 2],
    pub authenticity: u8,
    pub short_sale_threshold: u8,
    pub ipo_flag: u8,
    pub luld_reference_price_tier: u8,
    pub etp_flag: u8,
    pub etp_leverage_factor: u32,
    pub inverse_indicator: u8,
}

/// 'H' - Stock Trading Action
#[derive(Clone, Copy, Debug)]
pub struct StockTradingAction {
    pub header: MessageHeader,
    pub stock: [u8; 8],
    /// 'H' halted, 'P' paused, 'Q' quotation only, 'T' trading
    pub trading_state: u8,
    pub reserved: u8,
    pub reason: [u8; 4],
}

/// 'A' - Add Order (no attribution)
#[derive(Clone, Copy, Debug)]
pub struct AddOrder {
    pub header: MessageHeader,
    pub order_ref: u64,
    pub side: Side,
    pub shares: u32,
    pub stock: [u8; 8],
    /// Fixed point, 4 decimal places
    pub price: u32,
}

impl AddOrder {
    pub fn symbol(&self) -> &str {
        symbol_str(&self.stock)
    }
}

/// 'F' - Add Order with MPID attribution
#[derive(Clone, Copy, Debug)]
pub struct AddOrderMpid {
    pub header: MessageHeader,
    pub order_ref: u64,
    pub side: Side,
    pub shares: u32,
    pub stock: [u8; 8],
    pub price: u32,
    pub mpid: [u8; 4],
}

impl AddOrderMpid {
    pub fn symbol(&self) -> &str {
        symbol_str(&self.stock)
    }
}

/// 'E' - Order Executed (at the resting price)
#[derive(Clone, Copy, Debug)]
pub struct OrderExecuted {
    pub header: MessageHeader,
    pub order_ref: u64,
    pub executed_shares: u32,
    pub match_number: u64,
}

/// 'C' - Order Executed with an explicit price
#[derive(Clone, Copy, Debug)]
pub struct OrderExecutedWithPrice {
    pub header: MessageHeader,
    pub order_ref: u64,
    pub executed_shares: u32,
    pub match_number: u64,
    pub printable: u8,
    pub execution_price: u32,
}

/// 'X' - Order Cancel (partial)
#[derive(Clone, Copy, Debug)]
pub struct OrderCancel {
    pub header: MessageHeader,
    pub order_ref: u64,
    pub cancelled_shares: u32,
}

/// 'D' - Order Delete (full)
#[derive(Clone, Copy, Debug)]
pub struct OrderDelete {
    pub header: MessageHeader,
    pub order_ref: u64,
}

/// 'U' - Order Replace
#[derive(Clone, Copy, Debug)]
pub struct OrderReplace {
    pub header: MessageHeader,
    pub original_order_ref: u64,
    pub new_order_ref: u64,
    pub shares: u32,
    pub price: u32,
}

/// 'P' - Trade (non-cross, hidden order print)
#[derive(Clone, Copy, Debug)]
pub struct Trade {
    pub header: MessageHeader,
    pub order_ref: u64,
    pub side: Side,
    pub shares: u32,
    pub stock: [u8; 8],
    pub price: u32,
    pub match_number: u64,
}

impl Trade {
    pub fn symbol(&self) -> &str {
        symbol_str(&self.stock)
    }
}

/// 'Q' - Cross Trade
#[derive(Clone, Copy, Debug)]
pub struct CrossTrade {
    pub header: MessageHeader,
    pub shares: u64,
    pub stock: [u8; 8],
    pub cross_price: u32,
    pub match_number: u64,
    pub cross_type: u8,
}

impl CrossTrade {
    pub fn symbol(&self) -> &str {
        symbol_str(&self.stock)
    }
}

/// 'B' - Broken Trade
#[derive(Clone, Copy, Debug)]
pub struct BrokenTrade {
    pub header: MessageHeader,
    pub match_number: u64,
}

/// 'I' - Net Order Imbalance Indicator
#[derive(Clone, Copy, Debug)]
pub struct Noii {
    pub header: MessageHeader,
    pub paired_shares: u64,
    pub imbalance_shares: u64,
    pub imbalance_direction: u8,
    pub stock: [u8; 8],
    pub far_price: u32,
    pub near_price: u32,
    pub current_reference_price: u32,
    pub cross_type: u8,
    pub price_variation_indicator: u8,
}

/// One handler method per decoded message kind; every method defaults
/// to a no-op so implementors subscribe only to what they need. Kinds
/// with no decoded payload (RegSHO, MWCB, halts, ...) are length-skipped
/// by the parser and have no hook.
pub trait MessageHandler {
    fn on_system_event(&mut self, _msg: &SystemEvent) {}
    fn on_stock_directory(&mut self, _msg: &StockDirectory) {}
    fn on_stock_trading_action(&mut self, _msg: &StockTradingAction) {}
    fn on_add_order(&mut self, _msg: &AddOrder) {}
    fn on_add_order_mpid(&mut self, _msg: &AddOrderMpid) {}
    fn on_order_executed(&mut self, _msg: &OrderExecuted) {}
    fn on_order_executed_with_price(&mut self, _msg: &OrderExecutedWithPrice) {}
    fn on_order_cancel(&mut self, _msg: &OrderCancel) {}
    fn on_order_delete(&mut self, _msg: &OrderDelete) {}
    fn on_order_replace(&mut self, _msg: &OrderReplace) {}
    fn on_trade(&mut self, _msg: &Trade) {}
    fn on_cross_trade(&mut self, _msg: &CrossTrade) {}
    fn on_broken_trade(&mut self, _msg: &BrokenTrade) {}
    fn on_noii(&mut self, _msg: &Noii) {}
}

/// Stateless big-endian parser with parse counters.
#[derive(Debug, Default)]
pub struct Parser {
    messages_parsed: u64,
    bytes_parsed: u64,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one message from the front of `buf`, dispatching to the
    /// handler. Returns the bytes consumed, or 0 when the buffer is
    /// empty, the type tag is unknown, or the buffer is shorter than
    /// the message (caller should buffer more).
    pub fn parse_message<H: MessageHandler>(&mut self, buf: &[u8], handler: &mut H) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let Some(kind) = MessageKind::from_byte(buf[0]) else {
            return 0;
        };
        let length = kind.wire_length();
        if buf.len() < length {
            return 0;
        }

        let header = MessageHeader {
            kind,
            stock_locate: be_u16(buf, 1),
            tracking_number: be_u16(buf, 3),
            timestamp: be_u48(buf, 5),
        };

        match kind {
            MessageKind::SystemEvent => {
                handler.on_system_event(&SystemEvent {
                    header,
                    event_code: buf[11],
                });
            }
            MessageKind::StockDirectory => {
                handler.on_stock_directory(&StockDirectory {
                    header,
                    stock: read_array(buf, 11),
                    market_category: buf[19],
                    financial_status: buf[20],
                    round_lot_size: be_u32(buf, 21),
                    round_lots_only: buf[25],
                    issue_classification: buf[26],
                    issue_subtype: read_array(buf, 27),
                    authenticity: buf[29],
                    short_sale_threshold: buf[30],
                    ipo_flag: buf[31],
                    luld_reference_price_tier: buf[32],
                    etp_flag: buf[33],
                    etp_leverage_factor: be_u32(buf, 34),
                    inverse_indicator: buf[38],
                });
            }
            MessageKind::StockTradingAction => {
                handler.on_stock_trading_action(&StockTradingAction {
                    header,
                    stock: read_array(buf, 11),
                    trading_state: buf[19],
                    reserved: buf[20],
                    reason: read_array(buf, 21),
                });
            }
            MessageKind::AddOrder => {
                handler.on_add_order(&AddOrder {
                    header,
                    order_ref: be_u64(buf, 11),
                    side: wire_side(buf[19]),
                    shares: be_u32(buf, 20),
                    stock: read_array(buf, 24),
                    price: be_u32(buf, 32),
                });
            }
            MessageKind::AddOrderMpid => {
                handler.on_add_order_mpid(&AddOrderMpid {
                    header,
                    order_ref: be_u64(buf, 11),
                    side: wire_side(buf[19]),
                    shares: be_u32(buf, 20),
                    stock: read_array(buf, 24),
                    price: be_u32(buf, 32),
                    mpid: read_array(buf, 36),
                });
            }
            MessageKind::OrderExecuted => {
                handler.on_order_executed(&OrderExecuted {
                    header,
                    order_ref: be_u64(buf, 11),
                    executed_shares: be_u32(buf, 19),
                    match_number: be_u64(buf, 23),
                });
            }
            MessageKind::OrderExecutedWithPrice => {
                handler.on_order_executed_with_price(&OrderExecutedWithPrice {
                    header,
                    order_ref: be_u64(buf, 11),
                    executed_shares: be_u32(buf, 19),
                    match_number: be_u64(buf, 23),
                    printable: buf[31],
                    execution_price: be_u32(buf, 32),
                });
            }
            MessageKind::OrderCancel => {
                handler.on_order_cancel(&OrderCancel {
                    header,
                    order_ref: be_u64(buf, 11),
                    cancelled_shares: be_u32(buf, 19),
                });
            }
            MessageKind::OrderDelete => {
                handler.on_order_delete(&OrderDelete {
                    header,
                    order_ref: be_u64(buf, 11),
                });
            }
            MessageKind::OrderReplace => {
                handler.on_order_replace(&OrderReplace {
                    header,
                    original_order_ref: be_u64(buf, 11),
                    new_order_ref: be_u64(buf, 19),
                    shares: be_u32(buf, 27),
                    price: be_u32(buf, 31),
                });
            }
            MessageKind::Trade => {
                handler.on_trade(&Trade {
                    header,
                    order_ref: be_u64(buf, 11),
                    side: wire_side(buf[19]),
                    shares: be_u32(buf, 20),
                    stock: read_array(buf, 24),
                    price: be_u32(buf, 32),
                    match_number: be_u64(buf, 36),
                });
            }
            MessageKind::CrossTrade => {
                handler.on_cross_trade(&CrossTrade {
                    header,
                    shares: be_u64(buf, 11),
                    stock: read_array(buf, 19),
                    cross_price: be_u32(buf, 27),
                    match_number: be_u64(buf, 31),
                    cross_type: buf[39],
                });
            }
            MessageKind::BrokenTrade => {
                handler.on_broken_trade(&BrokenTrade {
                    header,
                    match_number: be_u64(buf, 11),
                });
            }
            MessageKind::Noii => {
                handler.on_noii(&Noii {
                    header,
                    paired_shares: be_u64(buf, 11),
                    imbalance_shares: be_u64(buf, 19),
                    imbalance_direction: buf[27],
                    stock: read_array(buf, 28),
                    far_price: be_u32(buf, 36),
                    near_price: be_u32(buf, 40),
                    current_reference_price: be_u32(buf, 44),
                    cross_type: buf[48],
                    price_variation_indicator: buf[49],
                });
            }
            // Known length, no decoded payload: consume and move on
            MessageKind::RegSho
            | MessageKind::MarketParticipantPosition
            | MessageKind::MwcbDeclineLevel
            | MessageKind::MwcbStatus
            | MessageKind::IpoQuotingPeriod
            | MessageKind::LuldAuctionCollar
            | MessageKind::OperationalHalt
            | MessageKind::Rpii => {}
        }

        self.messages_parsed += 1;
        self.bytes_parsed += length as u64;
        length
    }

    /// Parse messages until the buffer runs out (or an unknown tag or a
    /// truncated message stops progress). Returns total bytes consumed.
    pub fn parse_messages<H: MessageHandler>(&mut self, buf: &[u8], handler: &mut H) -> usize {
        let mut consumed = 0;
        while consumed < buf.len() {
            let step = self.parse_message(&buf[consumed..], handler);
            if step == 0 {
                break;
            }
            consumed += step;
        }
        consumed
    }

    #[inline]
    pub fn messages_parsed(&self) -> u64 {
        self.messages_parsed
    }

    #[inline]
    pub fn bytes_parsed(&self) -> u64 {
        self.bytes_parsed
    }

    pub fn reset_stats(&mut self) {
        self.messages_parsed = 0;
        self.bytes_parsed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Byte-builder for test messages.
    struct Writer {
        buf: Vec<u8>,
    }

    impl Writer {
        fn header(kind: u8, locate: u16, tracking: u16, timestamp: u64) -> Self {
            let mut buf = vec![kind];
            buf.extend_from_slice(&locate.to_be_bytes());
            buf.extend_from_slice(&tracking.to_be_bytes());
            buf.extend_from_slice(&timestamp.to_be_bytes()[2..8]);
            Self { buf }
        }

        fn u8(mut self, value: u8) -> Self {
            self.buf.push(value);
            self
        }

        fn u32(mut self, value: u32) -> Self {
            self.buf.extend_from_slice(&value.to_be_bytes());
            self
        }

        fn u64(mut self, value: u64) -> Self {
            self.buf.extend_from_slice(&value.to_be_bytes());
            self
        }

        fn stock(mut self, symbol: &str) -> Self {
            let mut field = [b' '; 8];
            field[..symbol.len()].copy_from_slice(symbol.as_bytes());
            self.buf.extend_from_slice(&field);
            self
        }

        fn bytes(mut self, data: &[u8]) -> Self {
            self.buf.extend_from_slice(data);
            self
        }

        fn build(self) -> Vec<u8> {
            self.buf
        }
    }

    fn add_order_bytes(order_ref: u64, side: u8, shares: u32, symbol: &str, price: u32) -> Vec<u8> {
        Writer::header(b'A', 1, 0, 1)
            .u64(order_ref)
            .u8(side)
            .u32(shares)
            .stock(symbol)
            .u32(price)
            .build()
    }

    #[derive(Default)]
    struct Recorder {
        adds: Vec<AddOrder>,
        adds_mpid: Vec<AddOrderMpid>,
        executes: Vec<OrderExecuted>,
        executes_with_price: Vec<OrderExecutedWithPrice>,
        cancels: Vec<OrderCancel>,
        deletes: Vec<OrderDelete>,
        replaces: Vec<OrderReplace>,
        trades: Vec<Trade>,
        cross_trades: Vec<CrossTrade>,
        broken: Vec<BrokenTrade>,
        system_events: Vec<SystemEvent>,
        directories: Vec<StockDirectory>,
        actions: Vec<StockTradingAction>,
        noiis: Vec<Noii>,
    }

    impl MessageHandler for Recorder {
        fn on_system_event(&mut self, msg: &SystemEvent) {
            self.system_events.push(*msg);
        }
        fn on_stock_directory(&mut self, msg: &StockDirectory) {
            self.directories.push(*msg);
        }
        fn on_stock_trading_action(&mut self, msg: &StockTradingAction) {
            self.actions.push(*msg);
        }
        fn on_add_order(&mut self, msg: &AddOrder) {
            self.adds.push(*msg);
        }
        fn on_add_order_mpid(&mut self, msg: &AddOrderMpid) {
            self.adds_mpid.push(*msg);
        }
        fn on_order_executed(&mut self, msg: &OrderExecuted) {
            self.executes.push(*msg);
        }
        fn on_order_executed_with_price(&mut self, msg: &OrderExecutedWithPrice) {
            self.executes_with_price.push(*msg);
        }
        fn on_order_cancel(&mut self, msg: &OrderCancel) {
            self.cancels.push(*msg);
        }
        fn on_order_delete(&mut self, msg: &OrderDelete) {
            self.deletes.push(*msg);
        }
        fn on_order_replace(&mut self, msg: &OrderReplace) {
            self.replaces.push(*msg);
        }
        fn on_trade(&mut self, msg: &Trade) {
            self.trades.push(*msg);
        }
        fn on_cross_trade(&mut self, msg: &CrossTrade) {
            self.cross_trades.push(*msg);
        }
        fn on_broken_trade(&mut self, msg: &BrokenTrade) {
            self.broken.push(*msg);
        }
        fn on_noii(&mut self, msg: &Noii) {
            self.noiis.push(*msg);
        }
    }

    #[test]
    fn test_add_order_known_vector() {
        // 41 0001 0000 000000000001 | 0000000000003039 42 00000064
        // 41414150 4C202020 20 0016E360
        let bytes: [u8; 36] = [
            0x41, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x30, 0x39, 0x42, 0x00, 0x00, 0x00, 0x64, 0x41, 0x41, 0x50, 0x4C,
            0x20, 0x20, 0x20, 0x20, 0x00, 0x16, 0xE3, 0x60,
        ];

        let mut parser = Parser::new();
        let mut recorder = Recorder::default();
        let consumed = parser.parse_message(&bytes, &mut recorder);

        assert_eq!(consumed, 36);
        assert_eq!(recorder.adds.len(), 1);

        let msg = &recorder.adds[0];
        assert_eq!(msg.header.kind, MessageKind::AddOrder);
        assert_eq!(msg.header.stock_locate, 1);
        assert_eq!(msg.header.tracking_number, 0);
        assert_eq!(msg.header.timestamp, 1);
        assert_eq!(msg.order_ref, 12345);
        assert_eq!(msg.side, Side::Buy);
        assert_eq!(msg.shares, 100);
        assert_eq!(msg.symbol(), "AAPL");
        assert_eq!(msg.price, 1_500_000); // 150.0000
    }

    #[test]
    fn test_builder_round_trips_wire_length() {
        let bytes = add_order_bytes(42, b'S', 500, "MSFT", 3_251_200);
        assert_eq!(bytes.len(), MessageKind::AddOrder.wire_length());

        let mut parser = Parser::new();
        let mut recorder = Recorder::default();
        assert_eq!(parser.parse_message(&bytes, &mut recorder), 36);

        let msg = &recorder.adds[0];
        assert_eq!(msg.order_ref, 42);
        assert_eq!(msg.side, Side::Sell);
        assert_eq!(msg.shares, 500);
        assert_eq!(msg.symbol(), "MSFT");
        assert_eq!(msg.price, 3_251_200);
    }

    #[test]
    fn test_empty_and_unknown_and_short() {
        let mut parser = Parser::new();
        let mut recorder = Recorder::default();

        assert_eq!(parser.parse_message(&[], &mut recorder), 0);
        assert_eq!(parser.parse_message(&[0x00, 0x01, 0x02], &mut recorder), 0);
        assert_eq!(parser.parse_message(b"zzzz", &mut recorder), 0);

        // Truncated AddOrder: caller should buffer more
        let bytes = add_order_bytes(1, b'B', 100, "AAPL", 1_500_000);
        assert_eq!(parser.parse_message(&bytes[..20], &mut recorder), 0);

        assert_eq!(parser.messages_parsed(), 0);
        assert_eq!(parser.bytes_parsed(), 0);
        assert!(recorder.adds.is_empty());
    }

    #[test]
    fn test_parse_messages_stream() {
        let mut stream = Vec::new();
        stream.extend(add_order_bytes(1, b'B', 100, "AAPL", 1_500_000));
        stream.extend(add_order_bytes(2, b'S', 200, "AAPL", 1_510_000));
        // Execute against ref 1
        stream.extend(
            Writer::header(b'E', 1, 0, 5)
                .u64(1)
                .u32(40)
                .u64(900)
                .build(),
        );
        let full_len = stream.len();
        // Trailing partial message must not be consumed
        stream.extend(&add_order_bytes(3, b'B', 50, "AAPL", 1_490_000)[..10]);

        let mut parser = Parser::new();
        let mut recorder = Recorder::default();
        let consumed = parser.parse_messages(&stream, &mut recorder);

        assert_eq!(consumed, full_len);
        assert_eq!(recorder.adds.len(), 2);
        assert_eq!(recorder.executes.len(), 1);
        assert_eq!(recorder.executes[0].order_ref, 1);
        assert_eq!(recorder.executes[0].executed_shares, 40);
        assert_eq!(recorder.executes[0].match_number, 900);

        assert_eq!(parser.messages_parsed(), 3);
        assert_eq!(parser.bytes_parsed(), full_len as u64);
    }

    #[test]
    fn test_decode_executed_with_price() {
        let bytes = Writer::header(b'C', 2, 7, 123_456)
            .u64(55)
            .u32(80)
            .u64(901)
            .u8(b'Y')
            .u32(1_495_000)
            .build();
        assert_eq!(bytes.len(), MessageKind::OrderExecutedWithPrice.wire_length());

        let mut parser = Parser::new();
        let mut recorder = Recorder::default();
        assert_eq!(parser.parse_message(&bytes, &mut recorder), 36);

        let msg = &recorder.executes_with_price[0];
        assert_eq!(msg.header.stock_locate, 2);
        assert_eq!(msg.header.tracking_number, 7);
        assert_eq!(msg.header.timestamp, 123_456);
        assert_eq!(msg.order_ref, 55);
        assert_eq!(msg.executed_shares, 80);
        assert_eq!(msg.match_number, 901);
        assert_eq!(msg.printable, b'Y');
        assert_eq!(msg.execution_price, 1_495_000);
    }

    #[test]
    fn test_decode_cancel_delete_replace() {
        let mut parser = Parser::new();
        let mut recorder = Recorder::default();

        let cancel = Writer::header(b'X', 1, 0, 10).u64(7).u32(25).build();
        assert_eq!(parser.parse_message(&cancel, &mut recorder), 23);
        assert_eq!(recorder.cancels[0].order_ref, 7);
        assert_eq!(recorder.cancels[0].cancelled_shares, 25);

        let delete = Writer::header(b'D', 1, 0, 11).u64(7).build();
        assert_eq!(parser.parse_message(&delete, &mut recorder), 19);
        assert_eq!(recorder.deletes[0].order_ref, 7);

        let replace = Writer::header(b'U', 1, 0, 12)
            .u64(7)
            .u64(8)
            .u32(300)
            .u32(1_480_000)
            .build();
        assert_eq!(parser.parse_message(&replace, &mut recorder), 35);
        assert_eq!(recorder.replaces[0].original_order_ref, 7);
        assert_eq!(recorder.replaces[0].new_order_ref, 8);
        assert_eq!(recorder.replaces[0].shares, 300);
        assert_eq!(recorder.replaces[0].price, 1_480_000);
    }

    #[test]
    fn test_decode_trade_and_cross_trade() {
        let mut parser = Parser::new();
        let mut recorder = Recorder::default();

        let trade = Writer::header(b'P', 3, 0, 99)
            .u64(0) // hidden order
            .u8(b'S')
            .u32(150)
            .stock("TSLA")
            .u32(2_000_000)
            .u64(777)
            .build();
        assert_eq!(trade.len(), MessageKind::Trade.wire_length());
        assert_eq!(parser.parse_message(&trade, &mut recorder), 44);
        let msg = &recorder.trades[0];
        assert_eq!(msg.side, Side::Sell);
        assert_eq!(msg.shares, 150);
        assert_eq!(msg.symbol(), "TSLA");
        assert_eq!(msg.price, 2_000_000);
        assert_eq!(msg.match_number, 777);

        let cross = Writer::header(b'Q', 3, 0, 100)
            .u64(10_000)
            .stock("TSLA")
            .u32(2_010_000)
            .u64(778)
            .u8(b'O')
            .build();
        assert_eq!(cross.len(), MessageKind::CrossTrade.wire_length());
        assert_eq!(parser.parse_message(&cross, &mut recorder), 40);
        let msg = &recorder.cross_trades[0];
        assert_eq!(msg.shares, 10_000);
        assert_eq!(msg.cross_price, 2_010_000);
        assert_eq!(msg.match_number, 778);
        assert_eq!(msg.cross_type, b'O');
    }

    #[test]
    fn test_decode_system_and_directory_and_action() {
        let mut parser = Parser::new();
        let mut recorder = Recorder::default();

        let event = Writer::header(b'S', 0, 0, 1).u8(b'O').build();
        assert_eq!(parser.parse_message(&event, &mut recorder), 12);
        assert_eq!(recorder.system_events[0].event_code, b'O');

        let directory = Writer::header(b'R', 4, 0, 2)
            .stock("AAPL")
            .u8(b'Q') // market category
            .u8(b'N') // financial status
            .u32(100) // round lot size
            .u8(b'N')
            .u8(b'C')
            .bytes(b"  ") // issue subtype
            .u8(b'P')
            .u8(b'N')
            .u8(b'N')
            .u8(b'1')
            .u8(b'N')
            .u32(0)
            .u8(b'N')
            .build();
        assert_eq!(directory.len(), MessageKind::StockDirectory.wire_length());
        assert_eq!(parser.parse_message(&directory, &mut recorder), 39);
        let msg = &recorder.directories[0];
        assert_eq!(symbol_str(&msg.stock), "AAPL");
        assert_eq!(msg.market_category, b'Q');
        assert_eq!(msg.round_lot_size, 100);
        assert_eq!(msg.luld_reference_price_tier, b'1');

        let action = Writer::header(b'H', 4, 0, 3)
            .stock("AAPL")
            .u8(b'H')
            .u8(0)
            .bytes(b"IPO1")
            .build();
        assert_eq!(action.len(), MessageKind::StockTradingAction.wire_length());
        assert_eq!(parser.parse_message(&action, &mut recorder), 25);
        assert_eq!(recorder.actions[0].trading_state, b'H');
        assert_eq!(&recorder.actions[0].reason, b"IPO1");
    }

    #[test]
    fn test_decode_noii() {
        let bytes = Writer::header(b'I', 5, 0, 4)
            .u64(1_000)
            .u64(250)
            .u8(b'B')
            .stock("NVDA")
            .u32(9_000_000)
            .u32(8_990_000)
            .u32(8_995_000)
            .u8(b'O')
            .u8(b'L')
            .build();
        assert_eq!(bytes.len(), MessageKind::Noii.wire_length());

        let mut parser = Parser::new();
        let mut recorder = Recorder::default();
        assert_eq!(parser.parse_message(&bytes, &mut recorder), 50);

        let msg = &recorder.noiis[0];
        assert_eq!(msg.paired_shares, 1_000);
        assert_eq!(msg.imbalance_shares, 250);
        assert_eq!(msg.imbalance_direction, b'B');
        assert_eq!(msg.far_price, 9_000_000);
        assert_eq!(msg.near_price, 8_990_000);
        assert_eq!(msg.current_reference_price, 8_995_000);
    }

    #[test]
    fn test_payload_free_kinds_are_skipped_not_dropped() {
        // RegSHO 'Y' is 20 bytes; only the header matters here
        let mut bytes = Writer::header(b'Y', 1, 0, 6).build();
        bytes.resize(20, 0);

        let mut parser = Parser::new();
        let mut recorder = Recorder::default();
        assert_eq!(parser.parse_message(&bytes, &mut recorder), 20);
        assert_eq!(parser.messages_parsed(), 1);
        assert_eq!(parser.bytes_parsed(), 20);
    }

    #[test]
    fn test_reset_stats() {
        let mut parser = Parser::new();
        let mut recorder = Recorder::default();
        let bytes = add_order_bytes(1, b'B', 100, "AAPL", 1_500_000);
        parser.parse_message(&bytes, &mut recorder);
        assert_eq!(parser.messages_parsed(), 1);

        parser.reset_stats();
        assert_eq!(parser.messages_parsed(), 0);
        assert_eq!(parser.bytes_parsed(), 0);
    }

    #[test]
    fn test_symbol_trimming() {
        assert_eq!(symbol_str(b"AAPL    "), "AAPL");
        assert_eq!(symbol_str(b"ABCDEFGH"), "ABCDEFGH");
        assert_eq!(symbol_str(b"        "), "");
    }
}
