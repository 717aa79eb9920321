use std::sync::LazyLock;

use redis::{Script, ScriptInvocation};

// The script bodies are part of the external protocol: differently configured
// clients (and other implementations) must run the exact same text.
const UNLOCK_LUA: &str = r#"
if redis.call("get",KEYS[1]) == ARGV[1] then
    return redis.call("del",KEYS[1])
else
    return 0
end
"#;
const EXTEND_LUA: &str = r#"
if redis.call("get",KEYS[1]) == ARGV[1] then
    return redis.call("pexpire",KEYS[1],ARGV[2])
else
    return 0
end
"#;

/// CAS-delete: the entry is removed only while it still holds the caller's token.
pub(crate) static UNLOCK_SCRIPT: LazyLock<LockScript> =
    LazyLock::new(|| LockScript::new(UNLOCK_LUA));
/// CAS-extend: the expiry is refreshed only while the entry still holds the caller's token.
pub(crate) static EXTEND_SCRIPT: LazyLock<LockScript> =
    LazyLock::new(|| LockScript::new(EXTEND_LUA));

/// A wrapper around one of the protocol's server-side scripts. These objects are reused.
pub(crate) struct LockScript {
    script: Script,
}

impl LockScript {
    fn new(body: &'static str) -> Self {
        Self {
            script: Script::new(body),
        }
    }

    /// Prepare an invocation on `resource`, proving ownership with `key`.
    pub(crate) fn invocation(
        &self,
        resource: &str,
        key: &[u8],
        extra_arg: Option<u64>,
    ) -> ScriptInvocation<'_> {
        let mut invocation = self.script.prepare_invoke();
        invocation.key(resource);
        invocation.arg(key);
        if let Some(extra_arg) = extra_arg {
            invocation.arg(extra_arg);
        }
        invocation
    }
}
