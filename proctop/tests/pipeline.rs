use proctop::{
    aggregate::{AggregationStage, LiveFilter},
    collectors::{
        cpu::CpuCounters,
        fake::{Reading, ScriptedSource},
        proc::{ProcState, ProcessSample},
        run_sampling_loop, Pipeline,
    },
    error::SampleError,
    sink::{board::GaugeBoard, Labels, PROCESS_CPU_GAUGE, PROCESS_MEMORY_GAUGE},
    top::TopEngine,
};
use std::time::Duration;

const TOTAL_MEMORY_KB: u64 = 1_048_576;

fn cpu(user: u64, idle: u64) -> CpuCounters {
    CpuCounters {
        user,
        idle,
        ..Default::default()
    }
}

fn proc(pid: i32, command: &str, user: u64, rss_kb: u64) -> ProcessSample {
    ProcessSample {
        pid,
        command: command.into(),
        state: ProcState::Running,
        user_ticks: user,
        kernel_ticks: 0,
        virtual_bytes: 0,
        rss_kb,
    }
}

fn command(name: &str) -> Labels {
    Labels::from([("command".to_string(), name.to_string())])
}

fn pipeline(src: ScriptedSource, board: &GaugeBoard) -> Pipeline<ScriptedSource> {
    let engine = TopEngine::new(src).unwrap();
    let stage = AggregationStage::new(LiveFilter::ExcludeTerminatedAndStopped, 0.5, 10);
    Pipeline::new(engine, stage, board.clone())
}

#[test]
fn worker_is_reported_then_decays_and_prunes() {
    let src = ScriptedSource::new(TOTAL_MEMORY_KB)
        .push(Reading {
            cpu: cpu(1000, 1000),
            processes: vec![proc(100, "worker", 0, 1024)],
        })
        .push(Reading {
            cpu: cpu(2000, 2000),
            processes: vec![proc(100, "worker", 1000, 1024)],
        })
        .push(Reading {
            cpu: cpu(3000, 3000),
            processes: vec![],
        })
        .push(Reading {
            cpu: cpu(4000, 4000),
            processes: vec![],
        });
    let board = GaugeBoard::new();
    let mut p = pipeline(src, &board);
    p.prime().unwrap();

    let first = p.tick().unwrap();
    assert_eq!(first.ranked.len(), 1);
    assert!((first.ranked[0].cpu_percent - 50.0).abs() < 1e-9);
    assert!((first.ranked[0].memory_percent - 0.09765625).abs() < 1e-9);
    assert_eq!(board.get(PROCESS_CPU_GAUGE, &command("worker")), Some(50.0));
    assert_eq!(board.get("node.cpu.user", &Labels::new()), Some(50.0));

    let second = p.tick().unwrap();
    assert_eq!(second.ranked.len(), 1);
    assert!(second.ranked[0].is_idle());
    assert_eq!(board.get(PROCESS_CPU_GAUGE, &command("worker")), Some(0.0));
    assert_eq!(board.get(PROCESS_MEMORY_GAUGE, &command("worker")), Some(0.0));

    let third = p.tick().unwrap();
    assert!(third.ranked.is_empty());
    assert!(third.retired.is_empty());
    assert_eq!(board.get(PROCESS_CPU_GAUGE, &command("worker")), None);
    assert_eq!(board.get(PROCESS_MEMORY_GAUGE, &command("worker")), None);
}

#[test]
fn short_lived_commands_do_not_accumulate_on_the_board() {
    let mut src = ScriptedSource::new(TOTAL_MEMORY_KB).push(Reading {
        cpu: cpu(1000, 1000),
        processes: vec![],
    });
    for i in 1..=5u64 {
        src = src.push(Reading {
            cpu: cpu(1000 * (i + 1), 1000 * (i + 1)),
            processes: vec![proc(100 + i as i32, &format!("job{i}"), 0, 1024)],
        });
    }
    let board = GaugeBoard::new();
    let engine = TopEngine::new(src).unwrap();
    let stage = AggregationStage::new(LiveFilter::ExcludeTerminatedAndStopped, 0.0, 10);
    let mut p = Pipeline::new(engine, stage, board.clone());
    p.prime().unwrap();
    for _ in 0..5 {
        p.tick().unwrap();
    }

    let text = board.render_prometheus();
    for gone in ["job1", "job2", "job3"] {
        assert!(!text.contains(gone), "{gone} still exported:\n{text}");
    }
    assert_eq!(board.get(PROCESS_MEMORY_GAUGE, &command("job4")), Some(0.0));
    assert!(board.get(PROCESS_MEMORY_GAUGE, &command("job5")).unwrap() > 0.0);
    assert_eq!(board.len(), 10 + 2 + 2);
}

#[test]
fn a_regressed_cpu_category_keeps_process_rates() {
    let counters = |tick: u64, iowait: u64| CpuCounters {
        user: 1000 * tick,
        idle: 1000 * tick,
        iowait,
        ..Default::default()
    };
    let src = ScriptedSource::new(TOTAL_MEMORY_KB)
        .push(Reading {
            cpu: counters(1, 500),
            processes: vec![proc(7, "db", 0, 1024)],
        })
        .push(Reading {
            cpu: counters(2, 500),
            processes: vec![proc(7, "db", 1000, 1024)],
        })
        .push(Reading {
            cpu: counters(3, 499),
            processes: vec![proc(7, "db", 2000, 1024)],
        });
    let board = GaugeBoard::new();
    let mut p = pipeline(src, &board);
    p.prime().unwrap();
    p.tick().unwrap();

    let out = p.tick().unwrap();
    assert!(out.retired.is_empty());
    assert_eq!(out.ranked.len(), 1);
    assert!((out.ranked[0].cpu_percent - 50.0).abs() < 1e-9);
    assert_eq!(board.get(PROCESS_CPU_GAUGE, &command("db")), Some(50.0));
    assert_eq!(board.get("node.cpu.iowait", &Labels::new()), Some(0.0));
}

#[test]
fn processes_sharing_a_command_are_summed() {
    let src = ScriptedSource::new(TOTAL_MEMORY_KB)
        .push(Reading {
            cpu: cpu(500, 500),
            processes: vec![proc(1, "app", 0, 100), proc(2, "app", 0, 200)],
        })
        .push(Reading {
            cpu: cpu(1000, 1000),
            processes: vec![proc(1, "app", 100, 100), proc(2, "app", 150, 200)],
        });
    let board = GaugeBoard::new();
    let mut p = pipeline(src, &board);
    p.prime().unwrap();
    let out = p.tick().unwrap();
    assert_eq!(out.ranked.len(), 1);
    assert!((out.ranked[0].cpu_percent - 25.0).abs() < 1e-9);
    assert_eq!(board.get(PROCESS_CPU_GAUGE, &command("app")), Some(25.0));
}

#[test]
fn unreadable_source_skips_the_tick() {
    let src = ScriptedSource::new(TOTAL_MEMORY_KB)
        .push(Reading {
            cpu: cpu(100, 100),
            processes: vec![proc(5, "svc", 0, 10)],
        })
        .push_failure()
        .push(Reading {
            cpu: cpu(200, 200),
            processes: vec![proc(5, "svc", 50, 10)],
        });
    let board = GaugeBoard::new();
    let mut p = pipeline(src, &board);
    p.prime().unwrap();

    assert!(matches!(
        p.tick(),
        Err(SampleError::SourceUnavailable { .. })
    ));
    assert!(board.is_empty());

    let out = p.tick().unwrap();
    assert!((out.ranked[0].cpu_percent - 25.0).abs() < 1e-9);
}

#[test]
fn frozen_cpu_counters_suppress_cpu_gauges_only() {
    let src = ScriptedSource::new(TOTAL_MEMORY_KB)
        .push(Reading {
            cpu: cpu(100, 100),
            processes: vec![proc(5, "svc", 0, 10)],
        })
        .push(Reading {
            cpu: cpu(100, 100),
            processes: vec![proc(5, "svc", 50, 10)],
        });
    let board = GaugeBoard::new();
    let mut p = pipeline(src, &board);
    p.prime().unwrap();
    let out = p.tick().unwrap();
    assert!(out.ranked.is_empty());
    assert_eq!(board.get("node.cpu.user", &Labels::new()), None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_retires_live_groups() {
    let mut src = ScriptedSource::new(TOTAL_MEMORY_KB);
    for i in 0..3u64 {
        src = src.push(Reading {
            cpu: cpu(1000 * (i + 1), 1000 * (i + 1)),
            processes: vec![proc(7, "daemon", 400 * i, 2048)],
        });
    }
    let board = GaugeBoard::new();
    let p = pipeline(src, &board);
    let interval = Duration::from_secs(5);
    let shutdown = tokio::time::sleep(Duration::from_secs(12));

    let p = run_sampling_loop(p, interval, shutdown).await;

    assert_eq!(p.engine().process_count(), 1);
    assert_eq!(board.get(PROCESS_CPU_GAUGE, &command("daemon")), Some(0.0));
    assert_eq!(board.get(PROCESS_MEMORY_GAUGE, &command("daemon")), Some(0.0));
    assert!((board.get("node.cpu.user", &Labels::new()).unwrap() - 50.0).abs() < 1e-9);
}
