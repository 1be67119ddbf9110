//! Whole-corridor runs: determinism, invariants and replications

use bus_corridor::simulation::{CorridorConfig, SimCorridor, StopConfig};
use std::collections::{BTreeMap, HashSet};

#[test]
fn test_demo_corridor_runs_and_finishes_buses() {
    let mut corridor = SimCorridor::new(CorridorConfig::demo(), 42).expect("demo is valid");
    corridor.run(2000).unwrap();

    let stats = corridor.stats();
    assert!(stats.dispatched > 0);
    assert!(stats.finished > 0);
    assert!(stats.finished <= stats.dispatched);
    assert_eq!(stats.stops.len(), 3);
    assert!(stats.stops.iter().all(|s| s.buses > 0));
    assert_eq!(corridor.time, 2000);
}

#[test]
fn test_every_tick_keeps_berth_marks_and_bus_locations_consistent() {
    let mut corridor = SimCorridor::new(CorridorConfig::demo(), 7).unwrap();

    for _ in 0..1500 {
        corridor.tick().unwrap();

        let mut seen = HashSet::new();
        for stop in &corridor.stops {
            for (slot, mark) in stop.berths().iter().zip(stop.servicing_marks()) {
                assert_eq!(slot.is_some(), *mark);
            }
            for bus in stop.berths().iter().flatten().copied().chain(stop.wait_zone()) {
                assert!(seen.insert(bus), "bus {bus:?} is in two places");
            }
            for line in stop.lines() {
                assert!(stop.uncommon_level(*line).unwrap() >= 0.0);
            }
        }
        for link in corridor.links.iter() {
            for bus in link.buses() {
                assert!(seen.insert(bus), "bus {bus:?} is in two places");
            }
        }
        for bus in corridor.fleet.iter() {
            if bus.finished_tick.is_some() {
                assert!(!seen.contains(&bus.id));
            }
        }
    }
}

#[test]
fn test_same_seed_gives_same_run() {
    let mut first = SimCorridor::new(CorridorConfig::demo(), 99).unwrap();
    let mut second = SimCorridor::new(CorridorConfig::demo(), 99).unwrap();
    first.run(1200).unwrap();
    second.run(1200).unwrap();
    assert_eq!(first.stats(), second.stats());
}

#[test]
fn test_replications_reset_between_runs() {
    let mut corridor = SimCorridor::new(CorridorConfig::demo(), 5).unwrap();
    let results = corridor.run_replications(800, 2, 5).unwrap();
    assert_eq!(results.len(), 2);

    let mut fresh = SimCorridor::new(CorridorConfig::demo(), 5).unwrap();
    fresh.run(800).unwrap();
    assert_eq!(results[0], fresh.stats());

    let mut fresh = SimCorridor::new(CorridorConfig::demo(), 6).unwrap();
    fresh.run(800).unwrap();
    assert_eq!(results[1], fresh.stats());
}

#[test]
fn test_reset_keeps_configuration() {
    let mut corridor = SimCorridor::new(CorridorConfig::demo(), 1).unwrap();
    corridor.run(500).unwrap();
    corridor.reset(1);

    assert_eq!(corridor.time, 0);
    assert!(corridor.fleet.is_empty());
    for stop in &corridor.stops {
        assert_eq!(stop.clock(), 0);
        assert_eq!(stop.bus_count(), 0);
        assert_eq!(stop.uncommon_queue().total(), 0.0);
        assert_eq!(stop.common_queue().total(), 0.0);
    }
    assert_eq!(corridor.stops[2].allocation_plan().len(), 4);
    assert!(corridor.stops[1].overtake_in());
    assert!(corridor.links.iter().all(|link| link.buses().count() == 0));
}

#[test]
fn test_last_stop_is_terminal() {
    let corridor = SimCorridor::new(CorridorConfig::demo(), 1).unwrap();
    let last = corridor.stops.len() - 1;
    assert!(corridor.stops[last].next_link().is_none());
    assert!(corridor.stops[..last].iter().all(|s| s.next_link().is_some()));
}

#[test]
fn test_snapshots_collect_bus_positions() {
    let mut corridor = SimCorridor::new(CorridorConfig::demo(), 3).unwrap();
    corridor.enable_snapshots();
    corridor.run(300).unwrap();

    let json = corridor.snapshots().unwrap().as_json();
    let buses = json["buses"].as_object().unwrap();
    assert!(!buses.is_empty());
    // first bus starts on the depot link
    assert_eq!(json["buses"]["0"]["0"]["link_id"], 0);
    assert!(json["pax_queues"]["0"].is_object());
}

#[test]
fn test_snapshot_places_each_bus_once_per_tick() {
    let mut corridor = SimCorridor::new(CorridorConfig::demo(), 3).unwrap();
    corridor.enable_snapshots();
    corridor.run(600).unwrap();

    let json = corridor.snapshots().unwrap().as_json();
    let mut on_link = 0;
    let mut at_stop = 0;
    for (bus, ticks) in json["buses"].as_object().unwrap() {
        for (tick, entry) in ticks.as_object().unwrap() {
            if entry["link_id"].as_i64().unwrap() >= 0 {
                on_link += 1;
                assert!(
                    entry.get("stop_id").is_none() && entry.get("berth_id").is_none(),
                    "bus {bus} at tick {tick} is on a link and at a stop: {entry}"
                );
            } else {
                at_stop += 1;
                assert!(entry["stop_id"].is_u64());
            }
        }
    }
    assert!(on_link > 0 && at_stop > 0);
}

#[test]
fn test_snapshot_ticks_match_corridor_time() {
    let mut corridor = SimCorridor::new(CorridorConfig::demo(), 3).unwrap();
    corridor.enable_snapshots();
    corridor.run(1).unwrap();

    let json = corridor.snapshots().unwrap().as_json();
    let ticks: Vec<&String> = json["pax_queues"]["0"].as_object().unwrap().keys().collect();
    assert_eq!(ticks, vec!["0"]);
    assert!(json["buses"]["0"]["0"].is_object());
    assert!(json["buses"]["0"].get("1").is_none());
}

#[test]
fn test_invalid_stop_in_config_is_rejected() {
    let mut config = CorridorConfig::demo();
    config.stops[1].queuing_rule = "jump_the_queue".to_string();
    assert!(SimCorridor::new(config, 1).is_err());

    let mut config = CorridorConfig::demo();
    config.stops.clear();
    assert!(SimCorridor::new(config, 1).is_err());
}

#[test]
fn test_config_parses_from_json() {
    let json = r#"{
        "stops": [
            {
                "berths": 2,
                "line_demand": { "0": 0.05, "1": 0.05 },
                "queuing_rule": "free_overtaking",
                "common_ratio": 0.3,
                "line_groups": { "0": 0, "1": 0 },
                "link_travel_ticks": 30
            }
        ],
        "services": [
            { "line": 0, "headway": 100 },
            { "line": 1, "headway": 100, "offset": 50, "capacity": 60 }
        ],
        "peak_start": 100,
        "peak_end": 500
    }"#;
    let config = CorridorConfig::from_json_str(json).unwrap();
    assert_eq!(config.stops.len(), 1);
    assert_eq!(config.stops[0].entering_type, "normal");
    assert_eq!(
        config.stops[0].line_groups,
        BTreeMap::from([(0, 0), (1, 0)])
    );
    assert_eq!(config.services[1].capacity, 60.0);
    assert!(config.is_peak(100));
    assert!(!config.is_peak(500));
    assert!(config.services[1].dispatches_at(150));
    assert!(!config.services[1].dispatches_at(20));

    let mut corridor = SimCorridor::new(config, 1).unwrap();
    corridor.run(1000).unwrap();
    let stats = corridor.stats();
    assert!(stats.finished > 0);
    // only buses dispatched in [100, 500) are tracked
    let tracked = corridor.fleet.iter().filter(|bus| bus.is_peak).count();
    assert!(tracked > 0 && tracked < stats.dispatched);
}

#[test]
fn test_stop_config_with_allocation_plan() {
    let config = StopConfig {
        berths: 2,
        line_demand: BTreeMap::from([(0, 0.1), (1, 0.1)]),
        entering_type: "allocation".to_string(),
        queuing_rule: "fifo".to_string(),
        common_ratio: 0.0,
        line_groups: BTreeMap::from([(0, 0), (1, 1)]),
        allocation_plan: Some(BTreeMap::from([(0, 1), (1, 0)])),
        link_travel_ticks: 10,
    };
    let stop = bus_corridor::simulation::SimStop::from_config(
        bus_corridor::simulation::StopId(bus_corridor::simulation::SimId(0)),
        &config,
    )
    .unwrap();
    assert_eq!(stop.allocation_plan().len(), 2);
}
