//! Built-in descriptor catalog
//!
//! Covers the common pipeline steps, agents, options, triggers, parameter
//! types, tools, when-conditions and build conditions. Extra descriptors can
//! be layered on top, e.g. from the configuration file.

use super::{Descriptor, DescriptorKind, DescriptorSource, ParamType};
use ahash::AHashMap;

use DescriptorKind as K;
use ParamType::{Any, Boolean, Integer, String as Str};

fn d(kind: DescriptorKind, name: &str) -> Descriptor {
    Descriptor::new(kind, name)
}

fn steps() -> Vec<Descriptor> {
    let shell = |name: &str| {
        d(K::Step, name)
            .param("script", Str, true)
            .param("returnStdout", Boolean, false)
            .param("returnStatus", Boolean, false)
            .param("label", Str, false)
            .param("encoding", Str, false)
    };
    vec![
        d(K::Step, "echo").param("message", Str, true),
        shell("sh"),
        shell("bat"),
        shell("powershell"),
        d(K::Step, "script").block(),
        d(K::Step, "timeout")
            .param("time", Integer, true)
            .param("unit", Str, false)
            .param("activity", Boolean, false)
            .block(),
        d(K::Step, "retry").param("count", Integer, true).block(),
        d(K::Step, "dir").param("path", Str, true).block(),
        d(K::Step, "withEnv").param("overrides", Any, true).block(),
        d(K::Step, "withCredentials").param("bindings", Any, true).block(),
        d(K::Step, "timestamps").block(),
        d(K::Step, "ansiColor").param("colorMapName", Str, true).block(),
        d(K::Step, "lock")
            .param("resource", Str, false)
            .param("label", Str, false)
            .param("quantity", Integer, false)
            .block(),
        d(K::Step, "catchError")
            .param("buildResult", Str, false)
            .param("stageResult", Str, false)
            .param("message", Str, false)
            .param("catchInterruptions", Boolean, false)
            .block(),
        d(K::Step, "warnError")
            .param("message", Str, true)
            .param("catchInterruptions", Boolean, false)
            .block(),
        d(K::Step, "waitUntil")
            .param("initialRecurrencePeriod", Integer, false)
            .param("quiet", Boolean, false)
            .block(),
        d(K::Step, "node").param("label", Str, false).block(),
        d(K::Step, "stage").param("name", Str, true).block(),
        d(K::Step, "parallel").param("branches", Any, false),
        d(K::Step, "properties").param("properties", Any, true),
        d(K::Step, "checkout")
            .param("scm", Any, true)
            .param("changelog", Boolean, false)
            .param("poll", Boolean, false),
        d(K::Step, "git")
            .param("url", Str, true)
            .param("branch", Str, false)
            .param("credentialsId", Str, false)
            .param("changelog", Boolean, false)
            .param("poll", Boolean, false),
        d(K::Step, "junit")
            .param("testResults", Str, true)
            .param("allowEmptyResults", Boolean, false)
            .param("keepLongStdio", Boolean, false),
        d(K::Step, "archiveArtifacts")
            .param("artifacts", Str, true)
            .param("allowEmptyArchive", Boolean, false)
            .param("excludes", Str, false)
            .param("fingerprint", Boolean, false)
            .param("onlyIfSuccessful", Boolean, false),
        d(K::Step, "stash")
            .param("name", Str, true)
            .param("includes", Str, false)
            .param("excludes", Str, false)
            .param("allowEmpty", Boolean, false)
            .param("useDefaultExcludes", Boolean, false),
        d(K::Step, "unstash").param("name", Str, true),
        d(K::Step, "input")
            .param("message", Str, true)
            .param("id", Str, false)
            .param("ok", Str, false)
            .param("submitter", Str, false)
            .param("submitterParameter", Str, false)
            .param("parameters", Any, false),
        d(K::Step, "error").param("message", Str, true),
        d(K::Step, "unstable").param("message", Str, true),
        d(K::Step, "sleep")
            .param("time", Integer, true)
            .param("unit", Str, false),
        d(K::Step, "writeFile")
            .param("file", Str, true)
            .param("text", Str, true)
            .param("encoding", Str, false),
        d(K::Step, "readFile")
            .param("file", Str, true)
            .param("encoding", Str, false),
        d(K::Step, "fileExists").param("file", Str, true),
        d(K::Step, "build")
            .param("job", Str, true)
            .param("parameters", Any, false)
            .param("wait", Boolean, false)
            .param("propagate", Boolean, false)
            .param("quietPeriod", Integer, false),
        d(K::Step, "deleteDir"),
        d(K::Step, "cleanWs")
            .param("deleteDirs", Boolean, false)
            .param("disableDeferredWipeout", Boolean, false)
            .param("notFailBuild", Boolean, false),
        d(K::Step, "mail")
            .param("to", Str, true)
            .param("subject", Str, true)
            .param("body", Str, true)
            .param("cc", Str, false)
            .param("bcc", Str, false)
            .param("from", Str, false)
            .param("replyTo", Str, false)
            .param("charset", Str, false)
            .param("mimeType", Str, false),
        d(K::Step, "tool")
            .param("name", Str, true)
            .param("type", Str, false),
        d(K::Step, "milestone")
            .param("ordinal", Integer, false)
            .param("label", Str, false),
        d(K::Step, "pwd").param("tmp", Boolean, false),
        d(K::Step, "isUnix"),
    ]
}

fn agents() -> Vec<Descriptor> {
    vec![
        d(K::Agent, "any"),
        d(K::Agent, "none"),
        d(K::Agent, "label").param("label", Str, true),
        d(K::Agent, "node")
            .param("label", Str, true)
            .param("customWorkspace", Str, false),
        d(K::Agent, "docker")
            .param("image", Str, true)
            .param("args", Str, false)
            .param("label", Str, false)
            .param("registryUrl", Str, false)
            .param("registryCredentialsId", Str, false)
            .param("alwaysPull", Boolean, false)
            .param("reuseNode", Boolean, false)
            .param("customWorkspace", Str, false),
        d(K::Agent, "dockerfile")
            .param("filename", Str, false)
            .param("dir", Str, false)
            .param("additionalBuildArgs", Str, false)
            .param("label", Str, false)
            .param("args", Str, false)
            .param("reuseNode", Boolean, false)
            .param("customWorkspace", Str, false),
        d(K::Agent, "kubernetes")
            .param("yaml", Str, false)
            .param("yamlFile", Str, false)
            .param("cloud", Str, false)
            .param("label", Str, false)
            .param("defaultContainer", Str, false)
            .param("inheritFrom", Str, false),
    ]
}

fn options() -> Vec<Descriptor> {
    vec![
        d(K::Option, "buildDiscarder").param("strategy", Any, true),
        d(K::Option, "checkoutToSubdirectory")
            .param("path", Str, true)
            .stage(),
        d(K::Option, "disableConcurrentBuilds").param("abortPrevious", Boolean, false),
        d(K::Option, "disableResume"),
        d(K::Option, "newContainerPerStage"),
        d(K::Option, "overrideIndexTriggers").param("value", Boolean, true),
        d(K::Option, "preserveStashes").param("buildCount", Integer, false),
        d(K::Option, "quietPeriod").param("quietPeriod", Integer, true),
        d(K::Option, "retry").param("count", Integer, true).stage(),
        d(K::Option, "skipDefaultCheckout")
            .param("value", Boolean, false)
            .stage(),
        d(K::Option, "skipStagesAfterUnstable"),
        d(K::Option, "parallelsAlwaysFailFast"),
        d(K::Option, "timeout")
            .param("time", Integer, true)
            .param("unit", Str, false)
            .param("activity", Boolean, false)
            .stage(),
        d(K::Option, "timestamps").stage(),
        d(K::Option, "ansiColor")
            .param("colorMapName", Str, true)
            .stage(),
        d(K::Option, "lock")
            .param("resource", Str, false)
            .param("label", Str, false)
            .param("quantity", Integer, false)
            .stage(),
    ]
}

fn triggers() -> Vec<Descriptor> {
    vec![
        d(K::Trigger, "cron").param("spec", Str, true),
        d(K::Trigger, "pollSCM")
            .param("scmpoll_spec", Str, true)
            .param("ignorePostCommitHooks", Boolean, false),
        d(K::Trigger, "upstream")
            .param("upstreamProjects", Str, true)
            .param("threshold", Any, false),
        d(K::Trigger, "githubPush"),
    ]
}

fn parameters() -> Vec<Descriptor> {
    let named = |name: &str| {
        d(K::Parameter, name)
            .param("name", Str, true)
            .param("description", Str, false)
    };
    vec![
        named("string")
            .param("defaultValue", Str, false)
            .param("trim", Boolean, false),
        named("text").param("defaultValue", Str, false),
        named("booleanParam").param("defaultValue", Boolean, false),
        named("choice").param("choices", Any, false),
        named("password").param("defaultValue", Str, false),
        named("file"),
        named("credentials")
            .param("credentialType", Str, false)
            .param("defaultValue", Str, false)
            .param("required", Boolean, false),
        named("run")
            .param("projectName", Str, false)
            .param("filter", Str, false),
    ]
}

fn tools() -> Vec<Descriptor> {
    ["maven", "jdk", "gradle", "nodejs", "go", "ant", "git"]
        .into_iter()
        .map(|name| d(K::Tool, name).param("name", Str, true))
        .collect()
}

fn when_conditions() -> Vec<Descriptor> {
    let compared = |name: &str, pattern_required: bool| {
        d(K::WhenCondition, name)
            .param("pattern", Str, pattern_required)
            .param("comparator", Str, false)
    };
    let change_request = [
        "id",
        "target",
        "branch",
        "fork",
        "url",
        "title",
        "author",
        "authorDisplayName",
        "authorEmail",
        "comparator",
    ]
    .into_iter()
    .fold(d(K::WhenCondition, "changeRequest"), |desc, p| desc.param(p, Str, false));

    vec![
        compared("branch", true),
        d(K::WhenCondition, "buildingTag"),
        d(K::WhenCondition, "changelog").param("pattern", Str, true),
        compared("changeset", true).param("caseSensitive", Boolean, false),
        change_request,
        d(K::WhenCondition, "environment")
            .param("name", Str, true)
            .param("value", Str, true)
            .param("ignoreCase", Boolean, false),
        d(K::WhenCondition, "equals")
            .param("expected", Any, true)
            .param("actual", Any, true),
        compared("tag", false),
        d(K::WhenCondition, "triggeredBy")
            .param("cause", Str, true)
            .param("detail", Str, false),
        d(K::WhenCondition, "isRestartedRun"),
        d(K::WhenCondition, "expression").block(),
        d(K::WhenCondition, "allOf").block(),
        d(K::WhenCondition, "anyOf").block(),
        d(K::WhenCondition, "not").block(),
    ]
}

fn build_conditions() -> Vec<Descriptor> {
    [
        "always",
        "changed",
        "fixed",
        "regression",
        "aborted",
        "success",
        "unsuccessful",
        "unstable",
        "failure",
        "notBuilt",
        "cleanup",
    ]
    .into_iter()
    .map(|name| d(K::BuildCondition, name))
    .collect()
}

/// In-memory descriptor catalog
#[derive(Debug, Clone)]
pub struct BuiltinCatalog {
    descriptors: AHashMap<DescriptorKind, Vec<Descriptor>>,
}

impl BuiltinCatalog {
    /// Catalog with the built-in descriptors
    #[must_use]
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        for descriptor in steps()
            .into_iter()
            .chain(agents())
            .chain(options())
            .chain(triggers())
            .chain(parameters())
            .chain(tools())
            .chain(when_conditions())
            .chain(build_conditions())
        {
            catalog.register(descriptor);
        }
        catalog
    }

    /// Catalog with no descriptors
    #[must_use]
    pub fn empty() -> Self {
        Self {
            descriptors: AHashMap::new(),
        }
    }

    /// Adds extra descriptors, replacing built-ins of the same kind and name
    #[must_use]
    pub fn with_descriptors(mut self, extra: impl IntoIterator<Item = Descriptor>) -> Self {
        for descriptor in extra {
            self.register(descriptor);
        }
        self
    }

    /// Registers one descriptor
    pub fn register(&mut self, descriptor: Descriptor) {
        let list = self.descriptors.entry(descriptor.kind).or_default();
        list.retain(|existing| existing.name != descriptor.name);
        list.push(descriptor);
    }

    /// Number of descriptors of a kind
    #[must_use]
    pub fn len(&self, kind: DescriptorKind) -> usize {
        self.descriptors.get(&kind).map_or(0, Vec::len)
    }
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorSource for BuiltinCatalog {
    fn find(&self, kind: DescriptorKind, name: &str) -> Option<Descriptor> {
        self.descriptors
            .get(&kind)?
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    fn names(&self, kind: DescriptorKind) -> Vec<String> {
        self.descriptors
            .get(&kind)
            .map(|list| list.iter().map(|d| d.name.clone()).collect())
            .unwrap_or_default()
    }
}
