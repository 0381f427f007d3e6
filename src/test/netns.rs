#[cfg(test)]
mod tests {
    use std::fs;

    use netlink_packet_route::link::InfoKind;

    use overlay_cni::error::{OverlayError, OverlayResult};
    use overlay_cni::network::links;
    use overlay_cni::network::netlink::{CreateLinkOptions, LinkID, Socket};
    use overlay_cni::network::netns::{Namespace, Repository};

    const THREAD_NS: &str = "/proc/thread-self/ns/net";

    #[test]
    fn test_get_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path()).unwrap();

        let err = repo.get("does-not-exist").unwrap_err();
        match err.unwrap() {
            OverlayError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected a not-exist io error, got {}", other),
        }
    }

    #[test]
    fn test_execute_missing_namespace() {
        let ns = Namespace::new("/does/not/exist/ns");
        let err = ns.execute(|_| Ok(())).unwrap_err();
        assert!(
            err.to_string().contains("/does/not/exist/ns"),
            "error does not name the path: {}",
            err
        );
    }

    #[test]
    fn test_create_get_destroy() {
        test_setup!();
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path()).unwrap();

        let ns = repo.create("sandbox").unwrap();
        assert!(ns.path().exists());

        // the entry must not register with iproute2
        let out = String::from_utf8(run_command!("ip", "netns", "list").stdout).unwrap();
        assert!(!out.contains("sandbox"), "named netns leaked: {}", out);

        // exclusive create semantics
        let err = repo.create("sandbox").unwrap_err();
        assert!(
            err.to_string().contains("create"),
            "unexpected error: {}",
            err
        );

        let got = repo.get("sandbox").unwrap();
        assert_eq!(got.path(), ns.path());

        // a fresh namespace holds nothing but a loopback device
        let sandbox_links = ns
            .execute(|_| {
                let mut sock = Socket::new()?;
                links::list_links(&mut sock)
            })
            .unwrap();
        assert_eq!(sandbox_links.len(), 1);
        assert_eq!(links::link_name(&sandbox_links[0]), Some("lo"));

        ns.destroy().unwrap();
        assert!(!ns.path().exists());
        assert!(repo.get("sandbox").is_err());
    }

    #[test]
    fn test_execute_restores_previous_namespace() {
        test_setup!();
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path()).unwrap();
        let ns = repo.create("restore-ns").unwrap();

        let before = fs::read_link(THREAD_NS).unwrap();

        ns.execute(|_| {
            let during = fs::read_link(THREAD_NS).unwrap();
            assert_ne!(during, before, "execute did not enter the namespace");
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_link(THREAD_NS).unwrap(), before);

        // the error path restores as well
        let result = ns.execute(|_| -> OverlayResult<()> { Err(OverlayError::msg("boom")) });
        assert!(result.is_err());
        assert_eq!(fs::read_link(THREAD_NS).unwrap(), before);

        ns.destroy().unwrap();
    }

    #[test]
    fn test_move_link_into_namespace() {
        test_setup!();
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path()).unwrap();
        let ns = repo.create("move-target").unwrap();

        let mut sock = Socket::new().unwrap();
        sock.create_link(CreateLinkOptions::new("movable0".into(), InfoKind::Dummy))
            .unwrap();
        let link = sock.get_link(LinkID::Name("movable0".into())).unwrap();

        let ns_file = ns.open().unwrap();
        sock.set_link_ns(link.header.index, &ns_file).unwrap();

        // gone here, present in the target namespace
        assert!(links::find_link(&mut sock, "movable0").unwrap().is_none());
        let moved = ns
            .execute(|_| {
                let mut inner = Socket::new()?;
                links::find_link(&mut inner, "movable0")
            })
            .unwrap();
        assert!(moved.is_some());

        ns.destroy().unwrap();
    }

    #[test]
    fn test_destroy_requires_bind_mount() {
        test_setup!();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain-file");
        fs::File::create(&path).unwrap();

        let err = Namespace::new(&path).destroy().unwrap_err();
        assert!(
            err.to_string().contains("unmount"),
            "unexpected error: {}",
            err
        );
    }
}
