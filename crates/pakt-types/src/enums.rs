//! Closed enumerations with canonical text names.
//!
//! Every type maps both ways between the variant and its wire name;
//! unrecognized text maps to `Unknown` rather than failing, so a newer
//! helper talking to an older daemon degrades instead of crashing.

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant in declaration order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            pub fn to_text(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            pub fn from_text(text: &str) -> Self {
                match text {
                    $( $text => $name::$variant, )+
                    _ => $name::Unknown,
                }
            }
        }

        impl crate::bitfield::BitEnum for $name {
            const VALUES: &'static [$name] = $name::ALL;

            fn index(self) -> u32 {
                self as u32
            }

            fn unknown() -> Self {
                $name::Unknown
            }

            fn to_text(self) -> &'static str {
                $name::to_text(self)
            }

            fn from_text(text: &str) -> Self {
                $name::from_text(text)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.to_text())
            }
        }
    };
}

text_enum! {
    /// The kind of transaction. Each role has one entry point on the
    /// backend.
    pub enum Role {
        Unknown => "unknown",
        AcceptEula => "accept-eula",
        Cancel => "cancel",
        DownloadPackages => "download-packages",
        GetCategories => "get-categories",
        GetDetails => "get-details",
        GetDistroUpgrades => "get-distro-upgrades",
        GetFiles => "get-files",
        GetPackages => "get-packages",
        GetRepoList => "get-repo-list",
        GetUpdateDetail => "get-update-detail",
        GetUpdates => "get-updates",
        InstallFiles => "install-files",
        InstallPackages => "install-packages",
        InstallSignature => "install-signature",
        RefreshCache => "refresh-cache",
        RemovePackages => "remove-packages",
        RepoEnable => "repo-enable",
        RepoRemove => "repo-remove",
        RepoSetData => "repo-set-data",
        Resolve => "resolve",
        SearchDetails => "search-details",
        SearchFile => "search-file",
        SearchGroup => "search-group",
        SearchName => "search-name",
        UpdatePackages => "update-packages",
        UpgradeSystem => "upgrade-system",
        WhatProvides => "what-provides",
    }
}

text_enum! {
    /// Where a running job currently is. Transitions are monotonic only
    /// within a phase; Download and Install may alternate.
    pub enum Status {
        Unknown => "unknown",
        Cancel => "cancel",
        Cleanup => "cleanup",
        Commit => "commit",
        DepResolve => "dep-resolve",
        Download => "download",
        DownloadRepository => "download-repository",
        Finished => "finished",
        Info => "info",
        Install => "install",
        LoadingCache => "loading-cache",
        Obsolete => "obsolete",
        Query => "query",
        RefreshCache => "refresh-cache",
        Remove => "remove",
        Request => "request",
        Running => "running",
        Setup => "setup",
        SigCheck => "sig-check",
        TestCommit => "test-commit",
        Update => "update",
        Wait => "wait",
    }
}

text_enum! {
    /// Per-package classification attached to emitted packages.
    pub enum Info {
        Unknown => "unknown",
        Available => "available",
        Installed => "installed",
        Low => "low",
        Enhancement => "enhancement",
        Normal => "normal",
        Bugfix => "bugfix",
        Important => "important",
        Security => "security",
        Blocked => "blocked",
        Downloading => "downloading",
        Updating => "updating",
        Installing => "installing",
        Removing => "removing",
        Cleanup => "cleanup",
        Obsoleting => "obsoleting",
        Reinstalling => "reinstalling",
        Downgrading => "downgrading",
        Preparing => "preparing",
        Finished => "finished",
        Untrusted => "untrusted",
        Trusted => "trusted",
    }
}

text_enum! {
    /// How a finished job ended.
    pub enum Exit {
        Unknown => "unknown",
        Success => "success",
        Failed => "failed",
        Cancelled => "cancelled",
        KeyRequired => "key-required",
        EulaRequired => "eula-required",
        Killed => "killed",
        MediaChangeRequired => "media-change-required",
        NeedUntrusted => "need-untrusted",
    }
}

text_enum! {
    /// Restart requirement advertised with an update.
    pub enum Restart {
        Unknown => "unknown",
        None => "none",
        Application => "application",
        Session => "session",
        System => "system",
        SecuritySession => "security-session",
        SecuritySystem => "security-system",
    }
}

text_enum! {
    pub enum SigType {
        Unknown => "unknown",
        Gpg => "gpg",
    }
}

text_enum! {
    /// Stability of a published update.
    pub enum UpdateState {
        Unknown => "unknown",
        Stable => "stable",
        Unstable => "unstable",
        Testing => "testing",
    }
}

text_enum! {
    pub enum DistroUpgradeState {
        Unknown => "unknown",
        Stable => "stable",
        Unstable => "unstable",
    }
}

text_enum! {
    pub enum MediaType {
        Unknown => "unknown",
        Cd => "cd",
        Dvd => "dvd",
        Disc => "disc",
    }
}

text_enum! {
    /// Scope of a distribution upgrade.
    pub enum UpgradeKind {
        Unknown => "unknown",
        Minimal => "minimal",
        Default => "default",
        Complete => "complete",
    }
}

text_enum! {
    /// Namespaces understood by what-provides queries.
    pub enum Provides {
        Unknown => "unknown",
        Any => "any",
        Codec => "codec",
        Font => "font",
        HardwareDriver => "hardware-driver",
        Mimetype => "mimetype",
        PostscriptDriver => "postscript-driver",
        PlasmaService => "plasma-service",
        SharedLib => "shared-lib",
        LanguageSupport => "language-support",
    }
}

text_enum! {
    pub enum Group {
        Unknown => "unknown",
        Accessibility => "accessibility",
        Accessories => "accessories",
        AdminTools => "admin-tools",
        Communication => "communication",
        DesktopGnome => "desktop-gnome",
        DesktopKde => "desktop-kde",
        DesktopOther => "desktop-other",
        DesktopXfce => "desktop-xfce",
        Education => "education",
        Fonts => "fonts",
        Games => "games",
        Graphics => "graphics",
        Internet => "internet",
        Legacy => "legacy",
        Localization => "localization",
        Maps => "maps",
        Multimedia => "multimedia",
        Network => "network",
        Office => "office",
        Other => "other",
        PowerManagement => "power-management",
        Programming => "programming",
        Publishing => "publishing",
        Repos => "repos",
        Science => "science",
        Security => "security",
        Servers => "servers",
        System => "system",
        Virtualization => "virtualization",
        Collections => "collections",
    }
}

text_enum! {
    /// Query post-filters. `Installed` and `NotInstalled` are mutually
    /// exclusive in any well-formed filter.
    pub enum Filter {
        Unknown => "unknown",
        Installed => "installed",
        NotInstalled => "~installed",
        Devel => "devel",
        NotDevel => "~devel",
        Gui => "gui",
        NotGui => "~gui",
        Free => "free",
        NotFree => "~free",
        Visible => "visible",
        NotVisible => "~visible",
        Supported => "supported",
        NotSupported => "~supported",
        Basename => "basename",
        NotBasename => "~basename",
        Newest => "newest",
        NotNewest => "~newest",
        Arch => "arch",
        NotArch => "~arch",
        Source => "source",
        NotSource => "~source",
        Application => "application",
        NotApplication => "~application",
        Downloaded => "downloaded",
        NotDownloaded => "~downloaded",
    }
}

text_enum! {
    /// Modifiers applied to a whole transaction.
    pub enum TransactionFlag {
        Unknown => "unknown",
        OnlyTrusted => "only-trusted",
        Simulate => "simulate",
        OnlyDownload => "only-download",
        AllowReinstall => "allow-reinstall",
        JustReinstall => "just-reinstall",
        AllowDowngrade => "allow-downgrade",
    }
}

text_enum! {
    /// The closed error taxonomy. One of these is recorded, at most
    /// once, on a failing job.
    pub enum PkError {
        Unknown => "unknown",
        OutOfMemory => "out-of-memory",
        NoNetwork => "no-network",
        NotSupported => "not-supported",
        InternalError => "internal-error",
        GpgFailure => "gpg-failure",
        PackageIdInvalid => "package-id-invalid",
        PackageNotInstalled => "package-not-installed",
        PackageNotFound => "package-not-found",
        PackageAlreadyInstalled => "package-already-installed",
        PackageDownloadFailed => "package-download-failed",
        GroupNotFound => "group-not-found",
        DepResolutionFailed => "dep-resolution-failed",
        FilterInvalid => "filter-invalid",
        TransactionError => "transaction-error",
        TransactionCancelled => "transaction-cancelled",
        NoCache => "no-cache",
        RepoNotFound => "repo-not-found",
        RepoConfigurationError => "repo-configuration-error",
        RepoAlreadySet => "repo-already-set",
        CannotRemoveSystemPackage => "cannot-remove-system-package",
        ProcessKill => "process-kill",
        FailedInitialization => "failed-initialization",
        FailedFinalise => "failed-finalise",
        FailedConfigParsing => "failed-config-parsing",
        CannotCancel => "cannot-cancel",
        CannotGetFilelist => "cannot-get-filelist",
        CannotFetchSource => "cannot-fetch-source",
        NoLicenseAgreement => "no-license-agreement",
        NoSpaceOnDevice => "no-space-on-device",
        NotAuthorized => "not-authorized",
        LocalInstallFailed => "local-install-failed",
        FileConflicts => "file-conflicts",
        FileNotFound => "file-not-found",
        InstallRootInvalid => "install-root-invalid",
        RepoNotAvailable => "repo-not-available",
        PackageConflicts => "package-conflicts",
        PackageFailedToRemove => "package-failed-to-remove",
    }
}
