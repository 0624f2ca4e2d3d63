//! A ring of transitions passing tokens around.
//!
//! Build with a few tokens on the first places and watch the handlers
//! chase them around the cycle:
//!
//! ```text
//! cargo run --example cycle -- -w 4 -t 5
//! ```

use tokenflow::{execute, Config, Net};

fn main() {
    let config = Config::from_args(std::env::args().skip(1)).expect("invalid arguments");

    let level = if config.is_debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let net = cycle_net(10, 4);
    execute(net, None, &config).expect("failed to start the worker pool");
}

/// A cycle of `length` places and transitions with `tokens` tokens on
/// the first places: `t[i]` moves a token from `p[i]` to `p[i+1]`.
fn cycle_net(length: usize, tokens: usize) -> Net {
    let mut net = Net::new("cycle_net");
    for i in 0..length {
        net.add_place(&format!("p[{}]", i), u64::from(i < tokens)).expect("fresh place");
        net.add_transition(&format!("t[{}]", i)).expect("fresh transition");
    }
    for i in 0..length {
        net.add_input(&format!("p[{}]", i), &format!("t[{}]", i), 1).expect("known arc endpoints");
        net.add_output(&format!("p[{}]", (i + 1) % length), &format!("t[{}]", i), 1)
            .expect("known arc endpoints");
    }
    net
}
