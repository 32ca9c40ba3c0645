// Cross-module pipeline tests. These drive the public API end to end and
// read the produced files back, at a scale suitable for the unit suite; the
// full-scale scenarios live in tests/scenarios.rs behind the integration
// environment switch.
