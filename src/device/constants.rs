/**
 * How often (milliseconds) to poll for new stats while the belt is running.
 */
pub const POLL_DELAY: u64 = 5000;

/**
 * How long (milliseconds) a round trip to the bridge may take before the request is evicted.
 */
pub const REQUEST_DEADLINE: u64 = 30_000;

/**
 * The address the bridge listens on by default.
 */
pub const DEFAULT_BRIDGE_URL: &str = "ws://127.0.0.1:8765";

/**
 * The line the bridge prints on stderr once it accepts connections.
 */
pub const BRIDGE_READY_MARKER: &str = "server listening on 127.0.0.1:8765";

/**
 * How long (milliseconds) the bridge may take to print BRIDGE_READY_MARKER.
 */
pub const BRIDGE_READY_DEADLINE: u64 = 30_000;

/**
 * Speed is expressed in the raw unit of the device, the terminal shows it divided by 16.
 * - SPEED_STEP is applied per increase/decrease
 * - the belt starts at DEFAULT_SPEED after every stop
 */
pub const SPEED_STEP: u8 = 4;
pub const DEFAULT_SPEED: u8 = 16;
pub const MIN_SPEED: u8 = 0;
pub const MAX_SPEED: u8 = 60;

/**
 * Length of the random correlation id attached to every request.
 */
pub const CORRELATION_ID_LEN: usize = 12;
