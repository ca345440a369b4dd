//! Tests for the in-process lock manager

use super::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_acquire_then_release() {
    let locks = LocalLockManager::new();

    locks.acquire("cluster-a").await.unwrap();
    locks.release("cluster-a").await.unwrap();

    // Re-acquirable after release
    locks.acquire("cluster-a").await.unwrap();
    locks.release("cluster-a").await.unwrap();
}

#[tokio::test]
async fn test_release_without_hold_is_error() {
    let locks = LocalLockManager::new();

    let err = locks.release("nothing").await.unwrap_err();
    assert!(matches!(err, LockError::NotHeld(_)));
}

#[tokio::test]
async fn test_second_acquire_blocks_until_release() {
    let locks = Arc::new(LocalLockManager::new());

    locks.acquire("cluster-a").await.unwrap();

    // The contender cannot get in while the lock is held
    let contender = locks.clone();
    let blocked = timeout(Duration::from_millis(50), contender.acquire("cluster-a")).await;
    assert!(blocked.is_err(), "second acquire should block");

    // After release the contender proceeds
    let waiter = {
        let locks = locks.clone();
        tokio::spawn(async move { locks.acquire("cluster-a").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    locks.release("cluster-a").await.unwrap();

    timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should acquire after release")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_exactly_one_of_two_contenders_wins() {
    let locks = Arc::new(LocalLockManager::new());

    let a = {
        let locks = locks.clone();
        tokio::spawn(async move { timeout(Duration::from_millis(100), locks.acquire("c")).await })
    };
    let b = {
        let locks = locks.clone();
        tokio::spawn(async move { timeout(Duration::from_millis(100), locks.acquire("c")).await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let wins = [a.is_ok(), b.is_ok()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1, "exactly one contender may hold the lock");
}

#[tokio::test]
async fn test_distinct_names_are_independent() {
    let locks = LocalLockManager::new();

    locks.acquire("cluster-a").await.unwrap();

    // A different name is immediately available
    timeout(Duration::from_millis(100), locks.acquire("cluster-b"))
        .await
        .expect("distinct name must not block")
        .unwrap();

    locks.release("cluster-a").await.unwrap();
    locks.release("cluster-b").await.unwrap();
}
