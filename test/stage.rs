// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::Workspace;

use anyhow::Result;
use dotstage::{
    filter::FilterError,
    stage::{LinkOutcome, StageError},
};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{fs::read_link, path::PathBuf};

const GENERIC: &str = indoc! {r#"
    #!/bin/sh
    ##only work
    echo A
    ##not work
    echo B
    ##end
"#};

#[test]
fn specialize_then_generalize_restores_generic_form() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("repo/.profile", GENERIC)?;
    let manager = workspace.manager(&["work"]);

    manager.specialize(".profile")?;
    let expect = indoc! {r#"
        #!/bin/sh
        ##only work
        echo A
        ##not work
        #echo B
        ##end
    "#};
    assert_eq!(workspace.read("stage/.profile")?, expect);

    // Edit on stage outside of any block, then fold it back.
    workspace.write("stage/.profile", format!("{expect}echo C\n"))?;
    manager.generalize(".profile")?;
    assert_eq!(workspace.read("repo/.profile")?, format!("{GENERIC}echo C\n"));

    Ok(())
}

#[test]
fn specialize_for_host_without_tags() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("repo/.profile", GENERIC)?;

    workspace.manager(&[]).specialize(".profile")?;
    let expect = indoc! {r#"
        #!/bin/sh
        ##only work
        #echo A
        ##not work
        echo B
        ##end
    "#};
    assert_eq!(workspace.read("stage/.profile")?, expect);

    Ok(())
}

#[test]
fn malformed_file_leaves_destination_untouched() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("repo/.bad", "#x\n##maybe foo\n##end\n")?;
    workspace.write("stage/.bad", "previous rendering\n")?;

    let result = workspace.manager(&["work"]).specialize(".bad");
    match result {
        Err(StageError::Filter { source, path }) => {
            assert_eq!(
                source,
                FilterError::UnknownDirective {
                    line: 2,
                    keyword: "maybe".into()
                }
            );
            assert_eq!(path, workspace.root().join("repo/.bad"));
        }
        other => panic!("expected filter error, got {other:?}"),
    }
    assert_eq!(workspace.read("stage/.bad")?, "previous rendering\n");

    Ok(())
}

#[test]
fn line_terminators_are_preserved() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("repo/crlf.ini", "; ini\r\n;;only a\r\nkey=1\r\n;;end\r\n")?;
    workspace.write("repo/bare.lua", "-- lua\n----not a\nx = 1\n----end")?;
    workspace.write("repo/empty", "")?;
    let manager = workspace.manager(&[]);

    manager.specialize("crlf.ini")?;
    manager.specialize("bare.lua")?;
    manager.specialize("empty")?;

    assert_eq!(
        workspace.read("stage/crlf.ini")?,
        "; ini\r\n;;only a\r\n;key=1\r\n;;end\r\n"
    );
    assert_eq!(workspace.read("stage/bare.lua")?, "-- lua\n----not a\nx = 1\n----end");
    assert_eq!(workspace.read("stage/empty")?, "");

    Ok(())
}

#[test]
fn mixed_line_terminators_pass_through() -> Result<()> {
    let workspace = Workspace::new()?;
    let generic = "# mixed\r\nexport A=1\n##only a\r\nexport B=2\n##end\r\nexport C=3";
    workspace.write("repo/.mixed", generic)?;
    let manager = workspace.manager(&[]);

    manager.specialize(".mixed")?;
    assert_eq!(
        workspace.read("stage/.mixed")?,
        "# mixed\r\nexport A=1\n##only a\r\n#export B=2\n##end\r\nexport C=3"
    );

    manager.generalize(".mixed")?;
    assert_eq!(workspace.read("repo/.mixed")?, generic);

    Ok(())
}

#[test]
fn missing_stage_is_empty() -> Result<()> {
    let workspace = Workspace::new()?;
    let manager = workspace.manager(&[]);

    assert!(manager.generalize_all()?.is_empty());
    assert!(manager.link_all()?.is_empty());
    manager.clean()?;
    assert!(!workspace.root().join("stage").exists());

    Ok(())
}

#[test]
fn specialize_all_walks_repository() -> Result<()> {
    let workspace = Workspace::new()?.with_settings(|settings| {
        settings.tag_config = settings.repository_tag_config();
    });
    workspace.write("repo/.bashrc", "# bash\nalias ll='ls -l'\n")?;
    workspace.write("repo/.config/app/conf", "# app\n")?;
    workspace.write("repo/.config/dotstage/tags.conf", "box: work\n")?;
    workspace.write("repo/.git/HEAD", "ref: refs/heads/main\n")?;

    let result = workspace.manager(&["work"]).specialize_all()?;
    let expect = vec![PathBuf::from(".bashrc"), PathBuf::from(".config/app/conf")];
    assert_eq!(result, expect);
    assert!(workspace.root().join("stage/.config/app/conf").is_file());
    assert!(!workspace.root().join("stage/.git").exists());

    Ok(())
}

#[test]
fn specialize_all_skips_stage_inside_repository() -> Result<()> {
    let workspace = Workspace::new()?.with_settings(|settings| {
        settings.stage = settings.repository.join("stage");
    });
    workspace.write("repo/.vimrc", "\" vim\n")?;
    workspace.write("repo/stage/.vimrc", "\" old\n")?;

    let result = workspace.manager(&[]).specialize_all()?;
    assert_eq!(result, vec![PathBuf::from(".vimrc")]);
    assert_eq!(workspace.read("repo/stage/.vimrc")?, "\" vim\n");

    Ok(())
}

#[test]
fn generalize_all_walks_stage() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("stage/.a", "#a\n##only x\n#one\n##end\n")?;
    workspace.write("stage/dir/.b", "#b\n")?;

    let result = workspace.manager(&[]).generalize_all()?;
    assert_eq!(result, vec![PathBuf::from(".a"), PathBuf::from("dir/.b")]);
    assert_eq!(workspace.read("repo/.a")?, "#a\n##only x\none\n##end\n");
    assert_eq!(workspace.read("repo/dir/.b")?, "#b\n");

    Ok(())
}

#[test]
fn generalize_unmanaged_file() -> Result<()> {
    let workspace = Workspace::new()?;
    let result = workspace.manager(&[]).generalize(".nothing");
    assert!(matches!(result, Err(StageError::NotManaged(path)) if path == PathBuf::from(".nothing")));

    Ok(())
}

#[cfg(unix)]
#[test]
fn link_and_remove() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("repo/.config/git/config", "# git\n")?;
    let manager = workspace.manager(&[]);
    manager.specialize(".config/git/config")?;

    assert_eq!(manager.link(".config/git/config")?, LinkOutcome::Created);
    let link = workspace.home().join(".config/git/config");
    assert_eq!(read_link(&link)?, manager.stage_path(".config/git/config"));
    assert_eq!(manager.link(".config/git/config")?, LinkOutcome::Exists);

    manager.remove(".config/git/config")?;
    assert!(link.symlink_metadata().is_err());
    assert!(!manager.stage_path(".config/git/config").exists());

    // Missing pieces only warn.
    manager.remove(".config/git/config")?;

    Ok(())
}

#[cfg(unix)]
#[test]
fn remove_leaves_regular_files_alone() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("home/.keep", "mine\n")?;
    workspace.write("stage/.keep", "#staged\n")?;

    workspace.manager(&[]).remove(".keep")?;
    assert_eq!(workspace.read("home/.keep")?, "mine\n");
    assert!(!workspace.root().join("stage/.keep").exists());

    Ok(())
}

#[cfg(unix)]
#[test]
fn link_all_skips_existing() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("stage/.a", "#a\n")?;
    workspace.write("stage/sub/.b", "#b\n")?;
    workspace.write("home/.a", "occupied\n")?;

    let result = workspace.manager(&[]).link_all()?;
    assert_eq!(result, vec![PathBuf::from("sub/.b")]);
    assert_eq!(workspace.read("home/.a")?, "occupied\n");
    assert_eq!(workspace.read("home/sub/.b")?, "#b\n");

    Ok(())
}

#[cfg(unix)]
#[test]
fn add_moves_links_and_generalizes() -> Result<()> {
    let workspace = Workspace::new()?;
    let specialized = indoc! {r#"
        " vimrc
        ""only gui
        "set guifont=Mono
        ""end
    "#};
    workspace.write("home/.vimrc", specialized)?;
    let manager = workspace.manager(&["tty"]);

    manager.add(".vimrc")?;
    let link = workspace.home().join(".vimrc");
    assert!(link.symlink_metadata()?.file_type().is_symlink());
    assert_eq!(workspace.read("stage/.vimrc")?, specialized);
    assert_eq!(
        workspace.read("repo/.vimrc")?,
        "\" vimrc\n\"\"only gui\nset guifont=Mono\n\"\"end\n"
    );

    let result = manager.add(".vimrc");
    assert!(matches!(result, Err(StageError::AlreadyLinked(_))));

    Ok(())
}

#[test]
fn add_rejects_malformed_file_without_moving_it() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("home/.rc", "set x\n")?;

    let result = workspace.manager(&[]).add(".rc");
    assert!(matches!(
        result,
        Err(StageError::Filter {
            source: FilterError::FirstLineNotComment { line: 1 },
            ..
        })
    ));
    assert_eq!(workspace.read("home/.rc")?, "set x\n");
    assert!(!workspace.root().join("stage/.rc").exists());

    Ok(())
}

#[cfg(unix)]
#[test]
fn clean_removes_stage_and_links() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.write("repo/.a", "#a\n")?;
    workspace.write("repo/d/.b", "#b\n")?;
    let manager = workspace.manager(&[]);
    manager.specialize_all()?;
    manager.link_all()?;

    manager.clean()?;
    assert!(!workspace.root().join("stage").exists());
    assert!(workspace.home().join(".a").symlink_metadata().is_err());
    assert!(workspace.home().join("d/.b").symlink_metadata().is_err());
    assert!(workspace.root().join("repo/d/.b").is_file());

    // Cleaning twice is harmless.
    manager.clean()?;

    Ok(())
}
