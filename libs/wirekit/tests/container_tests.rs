//! Container resolution, scoping and teardown.

use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wirekit::{Catalog, Container, ContainerError, Identifier, Inject, Scope};

fn no_args() -> Vec<Identifier> {
    Vec::new()
}

#[derive(Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[tokio::test]
async fn singleton_resolves_to_one_instance() {
    #[derive(Default)]
    struct Repo;

    let mut catalog = Catalog::new();
    catalog.class::<Repo>().provide().default_factory();
    let c = Container::new();
    c.load(&catalog).unwrap();

    let a = c.resolve("repo").await.unwrap();
    let b = c.resolve("repo").await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&c.get::<Repo>().await.unwrap(), &c.get::<Repo>().await.unwrap()));
}

#[tokio::test]
async fn concurrent_callers_share_one_construction() {
    struct Slow;

    let built = Arc::new(AtomicUsize::new(0));
    let inits = Arc::new(AtomicUsize::new(0));

    let mut catalog = Catalog::new();
    {
        let built = built.clone();
        let inits = inits.clone();
        catalog
            .class::<Slow>()
            .provide()
            .factory(no_args(), move |_| {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(Slow)
            })
            .init("warm_up", move |_s: Arc<Slow>| {
                let inits = inits.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    inits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
    }

    let c = Container::new();
    c.load(&catalog).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let c = c.clone();
            tokio::spawn(async move { c.resolve("slow").await })
        })
        .collect();
    let results = join_all(handles).await;

    let first = results[0].as_ref().unwrap().as_ref().unwrap().clone();
    for r in &results {
        assert!(Arc::ptr_eq(r.as_ref().unwrap().as_ref().unwrap(), &first));
    }
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_scope_is_per_child_and_singletons_are_shared() {
    struct Session;
    #[derive(Default)]
    struct Settings;

    let journal = Arc::new(Journal::default());
    let mut catalog = Catalog::new();
    catalog.class::<Settings>().provide().default_factory();
    {
        let journal = journal.clone();
        catalog
            .class::<Session>()
            .provide()
            .scope(Scope::Request)
            .factory(no_args(), |_| Ok(Session))
            .destroy("close", move |_s: Arc<Session>| {
                let journal = journal.clone();
                async move {
                    journal.push("session closed");
                    Ok(())
                }
            });
    }

    let root = Container::new();
    root.load(&catalog).unwrap();
    let first = root.create_child();
    let second = root.create_child();

    let s1 = first.resolve("session").await.unwrap();
    let s1_again = first.resolve("session").await.unwrap();
    let s2 = second.resolve("session").await.unwrap();
    assert!(Arc::ptr_eq(&s1, &s1_again));
    assert!(!Arc::ptr_eq(&s1, &s2));

    let g1 = first.resolve("settings").await.unwrap();
    let g2 = second.resolve("settings").await.unwrap();
    assert!(Arc::ptr_eq(&g1, &g2));
    assert!(Arc::ptr_eq(&g1, &root.resolve("settings").await.unwrap()));

    first.close().await;
    assert_eq!(journal.entries(), vec!["session closed"]);
    assert!(root.peek(&"settings".into()).is_some());
    assert!(second.peek(&"session".into()).is_some());
}

struct Store;

fn slow_store(catalog: &mut Catalog, scope: Scope, inits: Arc<AtomicUsize>) {
    catalog
        .class::<Store>()
        .provide_as("store")
        .scope(scope)
        .factory(no_args(), |_| Ok(Store))
        .init("open", move |_s: Arc<Store>| {
            let inits = inits.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
}

#[tokio::test]
async fn dependents_racing_on_a_shared_dependency_get_it_filled() {
    struct Orders {
        store: Inject<Store>,
    }
    struct Invoices {
        store: Inject<Store>,
    }

    let inits = Arc::new(AtomicUsize::new(0));
    let mut catalog = Catalog::new();
    slow_store(&mut catalog, Scope::Singleton, inits.clone());
    catalog
        .class::<Orders>()
        .provide_as("orders")
        .factory(no_args(), |_| Ok(Orders { store: Inject::new() }))
        .inject_named("store", "store", |o| &o.store);
    catalog
        .class::<Invoices>()
        .provide_as("invoices")
        .factory(no_args(), |_| Ok(Invoices { store: Inject::new() }))
        .inject_named("store", "store", |i| &i.store);
    let c = Container::new();
    c.load(&catalog).unwrap();

    let (orders, invoices) = tokio::join!(
        {
            let c = c.clone();
            tokio::spawn(async move { c.resolve_as::<Orders>("orders").await })
        },
        {
            let c = c.clone();
            tokio::spawn(async move { c.resolve_as::<Invoices>("invoices").await })
        }
    );
    let orders = orders.unwrap().unwrap();
    let invoices = invoices.unwrap().unwrap();

    assert!(!orders.store.is_deferred());
    assert!(!invoices.store.is_deferred());
    assert!(Arc::ptr_eq(&orders.store.get().unwrap(), &invoices.store.get().unwrap()));
    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parallel_requests_build_their_own_request_graph() {
    struct Handler {
        store: Inject<Store>,
    }

    let inits = Arc::new(AtomicUsize::new(0));
    let mut catalog = Catalog::new();
    slow_store(&mut catalog, Scope::Request, inits.clone());
    catalog
        .class::<Handler>()
        .provide_as("handler")
        .scope(Scope::Request)
        .factory(no_args(), |_| Ok(Handler { store: Inject::new() }))
        .inject_named("store", "store", |h| &h.store);
    let root = Container::new();
    root.load(&catalog).unwrap();

    let requests: Vec<_> = (0..2)
        .map(|_| {
            let child = root.create_child();
            tokio::spawn(async move {
                let handler = child.resolve_as::<Handler>("handler").await?;
                let store = handler.store.get()?;
                Ok::<_, ContainerError>((child, store))
            })
        })
        .collect();
    let stores: Vec<_> = join_all(requests)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert!(!Arc::ptr_eq(&stores[0].1, &stores[1].1));
    assert!(stores.iter().all(|(child, _)| child.peek(&"store".into()).is_some()));
    assert!(root.peek(&"store".into()).is_none());
    assert_eq!(inits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn prototype_on_a_property_cycle_fails_fast() {
    struct Draft {
        editor: Inject<Editor>,
    }
    struct Editor {
        draft: Inject<Draft>,
    }

    let mut catalog = Catalog::new();
    catalog
        .class::<Draft>()
        .provide_as("draft")
        .scope(Scope::Prototype)
        .factory(no_args(), |_| Ok(Draft { editor: Inject::new() }))
        .inject_named("editor", "editor", |d| &d.editor);
    catalog
        .class::<Editor>()
        .provide_as("editor")
        .factory(no_args(), |_| Ok(Editor { draft: Inject::new() }))
        .inject_named("draft", "draft", |e| &e.draft);
    let c = Container::new();
    c.load(&catalog).unwrap();

    let err = c.resolve("draft").await.unwrap_err();
    match &err {
        ContainerError::CyclicDependency { path } => {
            let names: Vec<&str> = path.iter().map(Identifier::as_str).collect();
            assert_eq!(names, vec!["draft", "editor", "draft"]);
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
    assert!(c.peek(&"editor".into()).is_none());

    // entering through the singleton defers it, and the prototype gets a fresh draft
    let editor = c.resolve_as::<Editor>("editor").await.unwrap();
    let draft = editor.draft.get().unwrap();
    assert!(Arc::ptr_eq(&draft.editor.get().unwrap(), &editor));
}

#[tokio::test]
async fn constructor_cycle_fails_with_its_path() {
    struct A;
    struct B;

    let mut catalog = Catalog::new();
    catalog.class::<A>().provide().factory(["b"], |_| Ok(A));
    catalog.class::<B>().provide().factory(["a"], |_| Ok(B));
    let c = Container::new();
    c.load(&catalog).unwrap();

    let err = c.resolve("a").await.unwrap_err();
    match &err {
        ContainerError::CyclicDependency { path } => {
            let names: Vec<&str> = path.iter().map(Identifier::as_str).collect();
            assert_eq!(names, vec!["a", "b", "a"]);
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
    assert_eq!(err.to_string(), "cyclic dependency detected: a -> b -> a");
    assert!(catalog.validate().is_err());
}

#[tokio::test]
async fn constructor_arguments_arrive_in_declared_order() {
    struct Pair {
        left: Arc<String>,
        right: Arc<u32>,
    }

    let mut catalog = Catalog::new();
    catalog.class::<Pair>().provide().factory(["name", "count"], |args| {
        Ok(Pair {
            left: args.get::<String>(0)?,
            right: args.get::<u32>(1)?,
        })
    });
    let c = Container::new();
    c.register_instance("name", Arc::new("wirekit".to_string()));
    c.register_instance("count", Arc::new(3u32));
    c.load(&catalog).unwrap();

    let pair = c.get::<Pair>().await.unwrap();
    assert_eq!(*pair.left, "wirekit");
    assert_eq!(*pair.right, 3);
}

#[tokio::test]
async fn deferred_property_read_during_init_is_not_ready() {
    struct Owner {
        helper: Inject<Helper>,
    }
    struct Helper {
        owner: Inject<Owner>,
        saw_not_ready: AtomicBool,
    }

    let mut catalog = Catalog::new();
    catalog
        .class::<Owner>()
        .provide()
        .factory(no_args(), |_| Ok(Owner { helper: Inject::new() }))
        .inject("helper", |o| &o.helper);
    catalog
        .class::<Helper>()
        .provide()
        .factory(no_args(), |_| {
            Ok(Helper {
                owner: Inject::new(),
                saw_not_ready: AtomicBool::new(false),
            })
        })
        .inject("owner", |h| &h.owner)
        .init("check", |h: Arc<Helper>| async move {
            let not_ready = matches!(h.owner.get(), Err(ContainerError::DependencyNotReady { .. }));
            h.saw_not_ready.store(not_ready, Ordering::SeqCst);
            Ok(())
        });

    let c = Container::new();
    c.load(&catalog).unwrap();

    let owner = c.get::<Owner>().await.unwrap();
    let helper = owner.helper.get().unwrap();
    assert!(helper.saw_not_ready.load(Ordering::SeqCst));
    assert!(Arc::ptr_eq(&helper.owner.get().unwrap(), &owner));
}

#[tokio::test]
async fn failing_init_hook_is_reported_and_not_cached() {
    struct Flaky;

    let attempts = Arc::new(AtomicUsize::new(0));
    let mut catalog = Catalog::new();
    {
        let attempts = attempts.clone();
        catalog
            .class::<Flaky>()
            .provide()
            .factory(no_args(), |_| Ok(Flaky))
            .init("connect", move |_f: Arc<Flaky>| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        anyhow::bail!("connection refused");
                    }
                    Ok(())
                }
            });
    }
    let c = Container::new();
    c.load(&catalog).unwrap();

    let err = c.resolve("flaky").await.unwrap_err();
    assert!(matches!(&err, ContainerError::Initialization { id, .. } if id.as_str() == "flaky"));
    assert!(c.peek(&"flaky".into()).is_none());
    assert!(c.resolve("flaky").await.is_ok());
}

#[tokio::test]
async fn destroy_all_runs_in_reverse_and_survives_failures() {
    struct First {
        journal: Arc<Journal>,
    }
    struct Second {
        journal: Arc<Journal>,
    }
    struct Third {
        journal: Arc<Journal>,
    }

    let mut catalog = Catalog::new();
    catalog
        .class::<First>()
        .provide()
        .factory(["journal"], |a| Ok(First { journal: a.get(0)? }))
        .destroy("close", |s: Arc<First>| async move {
            s.journal.push("first");
            Ok(())
        });
    catalog
        .class::<Second>()
        .provide()
        .factory(["journal"], |a| Ok(Second { journal: a.get(0)? }))
        .destroy("close", |s: Arc<Second>| async move {
            s.journal.push("second");
            Err::<(), _>(anyhow::anyhow!("socket already closed"))
        });
    catalog
        .class::<Third>()
        .provide()
        .factory(["journal"], |a| Ok(Third { journal: a.get(0)? }))
        .destroy("close", |s: Arc<Third>| async move {
            s.journal.push("third");
            Ok(())
        });

    let journal = Arc::new(Journal::default());
    let c = Container::new();
    c.register_instance("journal", journal.clone());
    c.load(&catalog).unwrap();

    c.resolve("first").await.unwrap();
    c.resolve("second").await.unwrap();
    c.resolve("third").await.unwrap();
    c.destroy_all().await;

    assert_eq!(journal.entries(), vec!["third", "second", "first"]);
    assert!(c.peek(&"first".into()).is_none());
}

#[tokio::test]
async fn destroy_evicts_even_when_the_hook_fails() {
    struct Conn;

    let mut catalog = Catalog::new();
    catalog
        .class::<Conn>()
        .provide()
        .factory(no_args(), |_| Ok(Conn))
        .destroy("close", |_c: Arc<Conn>| async { Err::<(), _>(anyhow::anyhow!("already closed")) });
    let c = Container::new();
    c.load(&catalog).unwrap();

    let before = c.resolve("conn").await.unwrap();
    c.destroy(&"conn".into()).await;
    assert!(c.peek(&"conn".into()).is_none());
    let after = c.resolve("conn").await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn listeners_see_every_created_object() {
    #[derive(Default)]
    struct Repo;

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut catalog = Catalog::new();
    catalog.class::<Repo>().provide().scope(Scope::Prototype).default_factory();
    let c = Container::new();
    c.load(&catalog).unwrap();
    {
        let seen = seen.clone();
        c.on_object_created(move |event| seen.lock().push(event.definition.id.to_string()));
    }

    c.resolve("repo").await.unwrap();
    c.create_child().resolve("repo").await.unwrap();
    assert_eq!(*seen.lock(), vec!["repo".to_string(), "repo".to_string()]);
}
