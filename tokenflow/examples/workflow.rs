//! A workflow net: the cycle example under a precedence constraint.
//!
//! The formula `t[0] ◁ t[5] ∧ t[5] ~◁ t[9]` lets `t[5]` fire only once
//! `t[0]` is in the trace, and shuts `t[9]` down as soon as `t[5]` has
//! fired.
//!
//! ```text
//! cargo run --example workflow -- -w 4 -t 5 -c
//! ```

use tokenflow::{execute, Config, Formula, Net};

fn main() {
    let config = Config::from_args(std::env::args().skip(1)).expect("invalid arguments");

    let level = if config.is_debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let net = cycle_net(10, 4);
    let formula = Formula::precedes("t[0]", "t[5]").and(Formula::not_precedes("t[5]", "t[9]"));
    execute(net, Some(formula), &config).expect("failed to start the worker pool");
}

/// Same net as the `cycle` example.
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
