// Protocol definitions shared between the live client and its tooling.

pub mod ws;
