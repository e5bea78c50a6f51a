use comic_sync::state::RunState;
use tempfile::TempDir;

const PAGE_SIZE: u64 = 100;

#[test]
fn test_sweep_resumes_at_saved_offset() {
    let dir = TempDir::new().unwrap();

    // first run: three pages completed, then the process dies
    {
        let mut state = RunState::load(dir.path());
        for page in 1..=3u64 {
            state.set_offset("4005-1443", page * PAGE_SIZE);
            state.inc_pages_done("4005-1443");
            state.save().unwrap();
        }
    }

    // restart resumes at 3 * page size, not zero
    let state = RunState::load(dir.path());
    assert_eq!(state.offset("4005-1443"), 300);
    assert_eq!(state.pages_done("4005-1443"), 3);
}

#[test]
fn test_interrupted_and_uninterrupted_runs_converge() {
    let interrupted = TempDir::new().unwrap();
    let straight = TempDir::new().unwrap();
    let volumes_by_page: [&[i64]; 3] = [&[1, 2], &[2, 3], &[4]];

    // run A: all pages in one process
    {
        let mut state = RunState::load(straight.path());
        for page in &volumes_by_page {
            for &id in *page {
                state.mark_processed(id);
            }
            state.save().unwrap();
        }
    }

    // run B: killed after page one, restarted for the rest
    {
        let mut state = RunState::load(interrupted.path());
        for &id in volumes_by_page[0] {
            state.mark_processed(id);
        }
        state.save().unwrap();
    }
    {
        let mut state = RunState::load(interrupted.path());
        for page in &volumes_by_page[1..] {
            for &id in *page {
                state.mark_processed(id);
            }
            state.save().unwrap();
        }
    }

    let a = RunState::load(straight.path());
    let b = RunState::load(interrupted.path());
    assert_eq!(a.processed_count(), b.processed_count());
    for id in [1, 2, 3, 4] {
        assert!(a.is_processed(id));
        assert!(b.is_processed(id));
    }
}

#[test]
fn test_processed_set_grows_monotonically_across_runs() {
    let dir = TempDir::new().unwrap();
    {
        let mut state = RunState::load(dir.path());
        state.mark_processed(100);
        state.save().unwrap();
    }
    {
        let mut state = RunState::load(dir.path());
        state.mark_processed(200);
        state.save().unwrap();
    }
    let state = RunState::load(dir.path());
    assert!(state.is_processed(100));
    assert!(state.is_processed(200));
    assert_eq!(state.processed_count(), 2);
}

#[test]
fn test_independent_characters_do_not_share_progress() {
    let dir = TempDir::new().unwrap();
    let mut state = RunState::load(dir.path());
    state.set_offset("4005-1443", 500);
    state.inc_pages_done("4005-1443");
    assert_eq!(state.offset("4005-2048"), 0);
    assert_eq!(state.pages_done("4005-2048"), 0);
}
